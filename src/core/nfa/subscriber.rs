// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Handler subscribers
//!
//! Downstream consumers observe a handler through one closed notification
//! type, [`HandlerNotification`], delivered to every registered
//! [`HandlerSubscriber`].
//!
//! ## Delivery guarantees
//! - Notifications are delivered synchronously, in the order the handler
//!   produced them, while the handler lock is held. A subscriber must not
//!   call back into the handler that notified it.
//! - A subscriber that returns an error or panics is logged and skipped; the
//!   remaining subscribers still receive the notification and the handler's
//!   state is unaffected.

use crate::core::error::SubscriberError;
use crate::core::event::{CompositeEvent, EventRef};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerNotification {
    Transition {
        nfa_name: String,
        run_id: String,
        state_name_from: String,
        state_name_to: String,
        event: EventRef,
    },
    Clone {
        nfa_name: String,
        run_id: String,
        state_name: String,
        event: EventRef,
    },
    Final {
        nfa_name: String,
        run_id: String,
        event: CompositeEvent,
    },
    Halt {
        nfa_name: String,
        run_id: String,
    },
}

impl HandlerNotification {
    pub fn nfa_name(&self) -> &str {
        match self {
            Self::Transition { nfa_name, .. }
            | Self::Clone { nfa_name, .. }
            | Self::Final { nfa_name, .. }
            | Self::Halt { nfa_name, .. } => nfa_name,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Transition { run_id, .. }
            | Self::Clone { run_id, .. }
            | Self::Final { run_id, .. }
            | Self::Halt { run_id, .. } => run_id,
        }
    }

    /// Short name of the notification kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transition { .. } => "transition",
            Self::Clone { .. } => "clone",
            Self::Final { .. } => "final",
            Self::Halt { .. } => "halt",
        }
    }
}

/// Consumer of handler notifications.
///
/// Implement [`on_notification`](Self::on_notification) to see everything in
/// one place, or override only the `on_handler_*` hooks you need.
pub trait HandlerSubscriber: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str {
        "subscriber"
    }

    fn on_notification(&self, notification: &HandlerNotification) -> Result<(), SubscriberError> {
        match notification {
            HandlerNotification::Transition {
                nfa_name,
                run_id,
                state_name_from,
                state_name_to,
                event,
            } => self.on_handler_transition(nfa_name, run_id, state_name_from, state_name_to, event),
            HandlerNotification::Clone {
                nfa_name,
                run_id,
                state_name,
                event,
            } => self.on_handler_clone(nfa_name, run_id, state_name, event),
            HandlerNotification::Final {
                nfa_name,
                run_id,
                event,
            } => self.on_handler_final(nfa_name, run_id, event),
            HandlerNotification::Halt { nfa_name, run_id } => self.on_handler_halt(nfa_name, run_id),
        }
    }

    fn on_handler_transition(
        &self,
        _nfa_name: &str,
        _run_id: &str,
        _state_name_from: &str,
        _state_name_to: &str,
        _event: &EventRef,
    ) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn on_handler_clone(
        &self,
        _nfa_name: &str,
        _run_id: &str,
        _state_name: &str,
        _event: &EventRef,
    ) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn on_handler_final(
        &self,
        _nfa_name: &str,
        _run_id: &str,
        _event: &CompositeEvent,
    ) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn on_handler_halt(&self, _nfa_name: &str, _run_id: &str) -> Result<(), SubscriberError> {
        Ok(())
    }
}

/// Registered subscribers, compared by identity (`Arc::ptr_eq`).
#[derive(Default)]
pub struct SubscriberSet {
    subscribers: Vec<Arc<dyn HandlerSubscriber>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns false if it was already registered.
    pub fn insert(&mut self, subscriber: Arc<dyn HandlerSubscriber>) -> bool {
        if self.contains(&subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn remove(&mut self, subscriber: &Arc<dyn HandlerSubscriber>) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| !Arc::ptr_eq(s, subscriber));
        self.subscribers.len() != before
    }

    pub fn contains(&self, subscriber: &Arc<dyn HandlerSubscriber>) -> bool {
        self.subscribers.iter().any(|s| Arc::ptr_eq(s, subscriber))
    }

    /// Deliver `notification` to every subscriber, isolating failures.
    ///
    /// Returns the number of subscribers that failed.
    pub fn publish(&self, notification: &HandlerNotification) -> usize {
        let mut failures = 0;
        for subscriber in &self.subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                subscriber.on_notification(notification)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    log::warn!(
                        "[{}] subscriber '{}' failed on {} for run '{}': {}",
                        notification.nfa_name(),
                        subscriber.name(),
                        notification.kind(),
                        notification.run_id(),
                        e
                    );
                }
                Err(panic_err) => {
                    failures += 1;
                    log::warn!(
                        "[{}] subscriber '{}' panicked on {} for run '{}': {:?}",
                        notification.nfa_name(),
                        subscriber.name(),
                        notification.kind(),
                        notification.run_id(),
                        panic_err
                    );
                }
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
