// SPDX-License-Identifier: MIT OR Apache-2.0

//! # EventFlux NFA runtime
//!
//! Pattern-matching core of the EventFlux complex event processing engine.
//! A [`Handler`](core::nfa::Handler) keeps the concurrent partial matches
//! ("runs") of one automaton against an event stream: it forks runs on
//! ambiguous transitions, turns runs that reach a final state into
//! [`CompositeEvent`](core::event::CompositeEvent)s, removes halted runs and
//! notifies subscribers about every transition, clone, final and halt.
//!
//! ```rust,ignore
//! use eventflux_nfa::core::nfa::{Handler, NfaBuilder};
//! use eventflux_nfa::core::nfa::predicate::attribute_equals;
//! use eventflux_nfa::core::event::Event;
//! use serde_json::json;
//!
//! let nfa = NfaBuilder::new("login_then_purchase")
//!     .start("S0")
//!     .state("S1")
//!     .final_state("S2")
//!     .transition("S0", "S1", attribute_equals("kind", json!("login")))
//!     .transition("S1", "S2", attribute_equals("kind", json!("purchase")))
//!     .build()?;
//!
//! let handler = Handler::with_defaults(nfa);
//! handler.process(Event::new(json!({"kind": "login"})).into_ref())?;
//! handler.process(Event::new(json!({"kind": "purchase"})).into_ref())?;
//! assert_eq!(handler.recent().len(), 1);
//! ```

pub mod core;
