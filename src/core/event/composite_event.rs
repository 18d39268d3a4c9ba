// SPDX-License-Identifier: MIT OR Apache-2.0

use super::history::History;
use serde::Serialize;

/// Output of a run that reached a final state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeEvent {
    /// Nanoseconds since the epoch, from the process clock
    pub timestamp: u64,
    /// Name of the automaton that produced the match
    pub name: String,
    pub history: History,
}

impl CompositeEvent {
    pub fn new(timestamp: u64, name: impl Into<String>, history: History) -> Self {
        Self {
            timestamp,
            name: name.into(),
            history,
        }
    }
}
