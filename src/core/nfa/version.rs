// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run versions
//!
//! Versions mirror the clone tree: a root run gets `n`, its first clone
//! `n.0`, that clone's second clone `n.0.1`, and so on. The string form is
//! the key under which a run's events are reserved in the match buffer.

use crate::core::error::NfaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    components: Vec<u32>,
}

impl Version {
    /// Version of a run that has no parent
    pub fn root(sequence: u32) -> Self {
        Self {
            components: vec![sequence],
        }
    }

    /// Version of the `discriminator`-th clone spawned from this version
    pub fn child(&self, discriminator: u32) -> Self {
        let mut components = self.components.clone();
        components.push(discriminator);
        Self { components }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.components.len() <= 1 {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Depth in the clone tree, 1 for root versions
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn is_ancestor_of(&self, other: &Version) -> bool {
        other.components.len() > self.components.len()
            && other.components.starts_with(&self.components)
    }

    pub fn get_version_as_str(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.components {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = NfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| NfaError::configuration(format!("malformed version '{}'", s)))?;
        Ok(Self { components })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
