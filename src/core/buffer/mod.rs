// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match buffer collaborator
//!
//! The buffer keeps the events a run has reserved, keyed by automaton name
//! and run version string. The handler seeds it when a run is created or
//! proceeds and releases a version when the run is removed.

use crate::core::event::EventRef;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Storage for matched-event references, keyed by version string.
pub trait MatchBuffer: Send + Sync {
    /// Reserve `event` for the run identified by `version` under `label`.
    fn put(&self, nfa_name: &str, version: &str, label: &str, event: EventRef);

    /// Release every entry tagged with `version`. Removing an absent version is a no-op.
    fn remove_version(&self, nfa_name: &str, version: &str);

    /// Serializable view of the entries held for `nfa_name`
    fn snapshot(&self, nfa_name: &str) -> Value;
}

#[derive(Debug, Clone)]
struct BufferEntry {
    label: String,
    event: EventRef,
}

/// Mutex-guarded in-memory buffer, used by default and in tests.
#[derive(Debug, Default)]
pub struct InMemoryMatchBuffer {
    inner: Mutex<HashMap<String, HashMap<String, Vec<BufferEntry>>>>,
}

impl InMemoryMatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions currently holding entries for `nfa_name`, sorted
    pub fn versions(&self, nfa_name: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut versions: Vec<String> = inner
            .get(nfa_name)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        versions.sort();
        versions
    }

    /// Number of entries reserved under `version`
    pub fn entry_count(&self, nfa_name: &str, version: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .get(nfa_name)
            .and_then(|m| m.get(version))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl MatchBuffer for InMemoryMatchBuffer {
    fn put(&self, nfa_name: &str, version: &str, label: &str, event: EventRef) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(nfa_name.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default()
            .push(BufferEntry {
                label: label.to_string(),
                event,
            });
    }

    fn remove_version(&self, nfa_name: &str, version: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(versions) = inner.get_mut(nfa_name) {
            versions.remove(version);
            if versions.is_empty() {
                inner.remove(nfa_name);
            }
        }
    }

    fn snapshot(&self, nfa_name: &str) -> Value {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut versions: Vec<(&String, &Vec<BufferEntry>)> = inner
            .get(nfa_name)
            .map(|m| m.iter().collect())
            .unwrap_or_default();
        versions.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = serde_json::Map::new();
        for (version, entries) in versions {
            let entries: Vec<Value> = entries
                .iter()
                .map(|entry| json!({ "label": entry.label, "event_id": entry.event.get_id() }))
                .collect();
            out.insert(version.clone(), Value::Array(entries));
        }
        Value::Object(out)
    }
}
