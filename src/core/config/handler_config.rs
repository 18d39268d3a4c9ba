// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Handler Configuration
//!
//! Settings for a run [`Handler`](crate::core::nfa::Handler), resolved from
//! two layers (low to high priority):
//!
//! 1. **TOML** - `HandlerConfig::from_toml_str` / `HandlerConfig::from_file`
//! 2. **Environment** - `EVENTFLUX_NFA_MAX_RECENT`, applied by
//!    [`HandlerConfig::with_env_overrides`]
//!
//! ```toml
//! max_recent = 25
//! ```

use crate::core::error::{NfaError, NfaResult};
use serde::Deserialize;
use std::path::Path;

/// Environment variable overriding `max_recent`
pub const ENV_MAX_RECENT: &str = "EVENTFLUX_NFA_MAX_RECENT";

/// Default capacity of the recent composite events list
pub const DEFAULT_MAX_RECENT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HandlerConfig {
    /// Requested capacity of the recent list. Values below 1 clamp to 1.
    pub max_recent: i64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_recent: DEFAULT_MAX_RECENT,
        }
    }
}

impl HandlerConfig {
    pub fn new(max_recent: i64) -> Self {
        Self { max_recent }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> NfaResult<Self> {
        toml::from_str(content)
            .map_err(|e| NfaError::configuration(format!("invalid handler config: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> NfaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Apply environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> NfaResult<Self> {
        if let Ok(raw) = std::env::var(ENV_MAX_RECENT) {
            self.max_recent = raw.trim().parse().map_err(|_| {
                NfaError::configuration_with_key(
                    format!("expected an integer, got '{}'", raw),
                    ENV_MAX_RECENT,
                )
            })?;
        }
        Ok(self)
    }

    /// Capacity actually used by the handler: `max(1, max_recent)`
    pub fn effective_max_recent(&self) -> usize {
        self.max_recent.max(1) as usize
    }
}
