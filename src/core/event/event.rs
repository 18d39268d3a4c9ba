// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to an input event. Runs and histories only ever hold these.
pub type EventRef = Arc<Event>;

/// An immutable fact from the input stream.
///
/// The payload is opaque to the runtime; only transition predicates look
/// inside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    id: u64,
    arrival: u64,
    payload: Value,
}

impl Event {
    /// Create an event with the next process-wide id. Arrival order follows id order.
    pub fn new(payload: Value) -> Self {
        let id = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            arrival: id,
            payload,
        }
    }

    /// Create an event with an explicit identity, e.g. when replaying a stream.
    pub fn with_id(id: u64, arrival: u64, payload: Value) -> Self {
        Self {
            id,
            arrival,
            payload,
        }
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> EventRef {
        Arc::new(self)
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    pub fn get_arrival(&self) -> u64 {
        self.arrival
    }

    pub fn get_payload(&self) -> &Value {
        &self.payload
    }

    /// Look up a top-level payload attribute
    pub fn get_attribute(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
