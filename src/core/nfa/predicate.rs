// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transition predicates
//!
//! How a predicate inspects an event is up to the automaton author. The
//! runtime only asks whether an edge fires for the event at hand.

use crate::core::event::{CompositeEvent, Event, History};
use std::fmt;

/// Everything a predicate may look at when deciding whether an edge fires
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    /// Incoming event
    pub event: &'a Event,
    /// Recent composite events, most recent first
    pub recent: &'a [CompositeEvent],
    /// History of the run being evaluated (empty for fresh start-state matches)
    pub history: &'a History,
}

impl<'a> MatchContext<'a> {
    pub fn new(event: &'a Event, recent: &'a [CompositeEvent], history: &'a History) -> Self {
        Self {
            event,
            recent,
            history,
        }
    }
}

impl fmt::Debug for MatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchContext")
            .field("event", &self.event.get_id())
            .field("recent", &self.recent.len())
            .field("history", &self.history.len())
            .finish()
    }
}

pub trait TransitionPredicate: Send + Sync {
    fn evaluate(&self, ctx: &MatchContext<'_>) -> bool;
}

impl<F> TransitionPredicate for F
where
    F: Fn(&MatchContext<'_>) -> bool + Send + Sync,
{
    fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        self(ctx)
    }
}

/// Pin a closure to the predicate signature so its lifetimes infer as higher-ranked.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&MatchContext<'_>) -> bool + Send + Sync,
{
    f
}

/// Predicate that fires for every event
pub fn always() -> impl TransitionPredicate {
    from_fn(|_| true)
}

/// Predicate that fires when the payload attribute `key` equals `expected`
pub fn attribute_equals(
    key: impl Into<String>,
    expected: serde_json::Value,
) -> impl TransitionPredicate {
    let key = key.into();
    from_fn(move |ctx| ctx.event.get_attribute(&key) == Some(&expected))
}
