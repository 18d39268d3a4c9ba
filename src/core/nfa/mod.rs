// SPDX-License-Identifier: MIT OR Apache-2.0

// Automaton definition (shared, read-only)
pub mod definition;
pub mod predicate;

// Run lifecycle and orchestration
pub mod handler; // Owner of live runs, event routing, notifications
pub mod run; // Single automaton traversal state machine
pub mod subscriber; // Downstream notification fan-out
pub mod version; // Clone-tree identifiers for buffer bookkeeping

pub use definition::{Edge, ForkPolicy, Nfa, NfaBuilder, State, TransitionSpec};
pub use handler::{Handler, HandlerSnapshot};
pub use predicate::{MatchContext, TransitionPredicate};
pub use run::{Run, RunSignal, RunSnapshot};
pub use subscriber::{HandlerNotification, HandlerSubscriber, SubscriberSet};
pub use version::Version;
