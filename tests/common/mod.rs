// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for handler integration tests

#![allow(dead_code)]

use eventflux_nfa::core::buffer::MatchBuffer;
use eventflux_nfa::core::event::{CompositeEvent, Event, EventRef};
use eventflux_nfa::core::nfa::{HandlerNotification, HandlerSubscriber};
use eventflux_nfa::core::SubscriberError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Event whose payload is `{"kind": kind}`
pub fn kind(k: &str) -> EventRef {
    Event::new(json!({ "kind": k })).into_ref()
}

/// Subscriber that records every notification it receives
#[derive(Default)]
pub struct RecordingSubscriber {
    seen: Mutex<Vec<HandlerNotification>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<HandlerNotification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind() == kind)
            .count()
    }

    pub fn finals(&self) -> Vec<CompositeEvent> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                HandlerNotification::Final { event, .. } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

impl HandlerSubscriber for RecordingSubscriber {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_notification(&self, notification: &HandlerNotification) -> Result<(), SubscriberError> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Buffer that counts `remove_version` calls per version
#[derive(Default)]
pub struct CountingBuffer {
    pub removals: Mutex<HashMap<String, usize>>,
    pub puts: Mutex<usize>,
}

impl CountingBuffer {
    pub fn removals_of(&self, version: &str) -> usize {
        self.removals
            .lock()
            .unwrap()
            .get(version)
            .copied()
            .unwrap_or(0)
    }
}

impl MatchBuffer for CountingBuffer {
    fn put(&self, _nfa_name: &str, _version: &str, _label: &str, _event: EventRef) {
        *self.puts.lock().unwrap() += 1;
    }

    fn remove_version(&self, _nfa_name: &str, version: &str) {
        *self
            .removals
            .lock()
            .unwrap()
            .entry(version.to_string())
            .or_default() += 1;
    }

    fn snapshot(&self, _nfa_name: &str) -> Value {
        json!({ "puts": *self.puts.lock().unwrap() })
    }
}
