// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run match history
//!
//! A [`History`] maps a state label to the events that satisfied that state
//! along one run's path. It is immutable: [`History::with_event`] returns a
//! new value sharing the event references, so a clone can start from its
//! parent's history without either side observing the other's later matches.

use super::event::EventRef;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    entries: BTreeMap<String, Vec<EventRef>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// History holding exactly one matched event
    pub fn single(label: impl Into<String>, event: EventRef) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(label.into(), vec![event]);
        Self { entries }
    }

    /// Return a copy of this history with `event` appended under `label`.
    pub fn with_event(&self, label: &str, event: EventRef) -> Self {
        let mut entries = self.entries.clone();
        entries.entry(label.to_string()).or_default().push(event);
        Self { entries }
    }

    pub fn get(&self, label: &str) -> Option<&[EventRef]> {
        self.entries.get(label).map(Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EventRef])> {
        self.entries
            .iter()
            .map(|(label, events)| (label.as_str(), events.as_slice()))
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of matched events across all labels
    pub fn event_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Most recently arrived event in this history
    pub fn latest(&self) -> Option<&EventRef> {
        self.entries
            .values()
            .flatten()
            .max_by_key(|event| event.get_arrival())
    }
}

impl Serialize for History {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, events) in &self.entries {
            let events: Vec<&crate::core::event::Event> = events.iter().map(Arc::as_ref).collect();
            map.serialize_entry(label, &events)?;
        }
        map.end()
    }
}
