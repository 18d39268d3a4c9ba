// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automaton definition
//!
//! An [`Nfa`] is built once through [`NfaBuilder`] and then shared read-only
//! (`Arc<Nfa>`) by the handler and all of its runs.
//!
//! ```rust,ignore
//! let nfa = NfaBuilder::new("login_then_purchase")
//!     .start("S0")
//!     .state("S1")
//!     .final_state("S2")
//!     .transition("S0", "S1", attribute_equals("kind", json!("login")))
//!     .transition("S1", "S2", attribute_equals("kind", json!("purchase")))
//!     .build()?;
//! ```

use super::predicate::{MatchContext, TransitionPredicate};
use crate::core::error::{NfaError, NfaResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a run does after forking on an ambiguous transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkPolicy {
    /// The forking run stays alive at its current state
    #[default]
    Retain,
    /// The forking run halts once its clones are spawned
    Halt,
}

/// A single automaton state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub name: String,
    /// Key used for this state in a run's history
    pub label: String,
    pub is_final: bool,
}

/// One outgoing edge of a state
#[derive(Clone)]
pub struct Edge {
    pub target: String,
    pub predicate: Arc<dyn TransitionPredicate>,
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge").field("target", &self.target).finish()
    }
}

/// Outgoing edges of a state and its fork policy
#[derive(Debug, Clone, Default)]
pub struct TransitionSpec {
    pub edges: Vec<Edge>,
    pub fork: ForkPolicy,
}

impl TransitionSpec {
    /// Declared target state names, in declaration order
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|edge| edge.target.as_str())
    }

    pub fn has_target(&self, state_name: &str) -> bool {
        self.edges.iter().any(|edge| edge.target == state_name)
    }
}

#[derive(Debug)]
pub struct Nfa {
    name: String,
    start_state: String,
    states: HashMap<String, State>,
    transitions: HashMap<String, TransitionSpec>,
}

impl Nfa {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_start_state(&self) -> &State {
        // Presence of the start state is checked by NfaBuilder::build.
        &self.states[&self.start_state]
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// Resolve a state or fail with an error naming this automaton
    pub fn require_state(&self, name: &str) -> NfaResult<&State> {
        self.states
            .get(name)
            .ok_or_else(|| NfaError::unknown_state(&self.name, name))
    }

    pub fn transition(&self, name: &str) -> Option<&TransitionSpec> {
        self.transitions.get(name)
    }

    pub fn is_final(&self, name: &str) -> bool {
        self.states.get(name).is_some_and(|state| state.is_final)
    }

    pub fn has_transition(&self, from: &str, to: &str) -> bool {
        self.transitions
            .get(from)
            .is_some_and(|spec| spec.has_target(to))
    }

    pub fn fork_policy(&self, name: &str) -> ForkPolicy {
        self.transitions
            .get(name)
            .map(|spec| spec.fork)
            .unwrap_or_default()
    }

    /// Targets of `from` whose predicates fire in `ctx`, in declaration order.
    pub fn matching_targets(&self, from: &str, ctx: &MatchContext<'_>) -> Vec<&State> {
        let Some(spec) = self.transitions.get(from) else {
            return Vec::new();
        };
        spec.edges
            .iter()
            .filter(|edge| edge.predicate.evaluate(ctx))
            .filter_map(|edge| self.states.get(&edge.target))
            .collect()
    }
}

/// Builder for [`Nfa`]. Validation errors surface in [`NfaBuilder::build`].
pub struct NfaBuilder {
    name: String,
    start_state: Option<String>,
    states: Vec<State>,
    transitions: Vec<(String, Edge)>,
    forks: Vec<(String, ForkPolicy)>,
}

impl NfaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_state: None,
            states: Vec::new(),
            transitions: Vec::new(),
            forks: Vec::new(),
        }
    }

    /// Mark `name` as the start state, declaring it as non-final if it is new.
    pub fn start(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.start_state = Some(name.clone());
        if self.states.iter().any(|state| state.name == name) {
            return self;
        }
        self.push_state(name, false)
    }

    /// Declare an intermediate state
    pub fn state(self, name: impl Into<String>) -> Self {
        self.push_state(name.into(), false)
    }

    pub fn final_state(self, name: impl Into<String>) -> Self {
        self.push_state(name.into(), true)
    }

    /// Declare a state whose history label differs from its name
    pub fn labeled_state(mut self, name: impl Into<String>, label: impl Into<String>, is_final: bool) -> Self {
        self.states.push(State {
            name: name.into(),
            label: label.into(),
            is_final,
        });
        self
    }

    /// Add an edge `from -> to`. A self-edge (`from == to`) counts repeats.
    pub fn transition<P>(mut self, from: impl Into<String>, to: impl Into<String>, predicate: P) -> Self
    where
        P: TransitionPredicate + 'static,
    {
        self.transitions.push((
            from.into(),
            Edge {
                target: to.into(),
                predicate: Arc::new(predicate),
            },
        ));
        self
    }

    pub fn on_fork(mut self, state: impl Into<String>, policy: ForkPolicy) -> Self {
        self.forks.push((state.into(), policy));
        self
    }

    fn push_state(mut self, name: String, is_final: bool) -> Self {
        self.states.push(State {
            label: name.clone(),
            name,
            is_final,
        });
        self
    }

    pub fn build(self) -> NfaResult<Arc<Nfa>> {
        let name = self.name;
        if name.is_empty() {
            return Err(NfaError::definition(name, "automaton name must not be empty"));
        }

        let mut states = HashMap::with_capacity(self.states.len());
        for state in self.states {
            if states.contains_key(&state.name) {
                return Err(NfaError::definition(
                    &name,
                    format!("state '{}' declared twice", state.name),
                ));
            }
            states.insert(state.name.clone(), state);
        }

        let start_state = self
            .start_state
            .ok_or_else(|| NfaError::definition(&name, "no start state declared"))?;

        let mut transitions: HashMap<String, TransitionSpec> = HashMap::new();
        for (from, edge) in self.transitions {
            for endpoint in [&from, &edge.target] {
                if !states.contains_key(endpoint) {
                    return Err(NfaError::definition(
                        &name,
                        format!("transition references undeclared state '{}'", endpoint),
                    ));
                }
            }
            transitions.entry(from).or_default().edges.push(edge);
        }

        for (state, policy) in self.forks {
            if !states.contains_key(&state) {
                return Err(NfaError::definition(
                    &name,
                    format!("fork policy set on undeclared state '{}'", state),
                ));
            }
            transitions.entry(state).or_default().fork = policy;
        }

        Ok(Arc::new(Nfa {
            name,
            start_state,
            states,
            transitions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{Event, History};
    use crate::core::nfa::predicate::{always, attribute_equals};
    use serde_json::json;

    fn two_step() -> Arc<Nfa> {
        NfaBuilder::new("two_step")
            .start("S0")
            .state("S1")
            .final_state("S2")
            .transition("S0", "S1", attribute_equals("kind", json!("A")))
            .transition("S1", "S2", attribute_equals("kind", json!("B")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookups() {
        let nfa = two_step();
        assert_eq!(nfa.get_name(), "two_step");
        assert_eq!(nfa.get_start_state().name, "S0");
        assert!(nfa.is_final("S2"));
        assert!(!nfa.is_final("S1"));
        assert!(!nfa.is_final("nope"));
        assert!(nfa.has_transition("S0", "S1"));
        assert!(!nfa.has_transition("S0", "S2"));
        assert_eq!(
            nfa.transition("S0").unwrap().state_names().collect::<Vec<_>>(),
            vec!["S1"]
        );
        assert!(matches!(
            nfa.require_state("S9"),
            Err(NfaError::UnknownState { .. })
        ));
    }

    #[test]
    fn test_matching_targets_in_declaration_order() {
        let nfa = NfaBuilder::new("fork")
            .start("S0")
            .final_state("S1b")
            .state("S1a")
            .transition("S0", "S1a", always())
            .transition("S0", "S1b", always())
            .build()
            .unwrap();

        let event = Event::with_id(1, 1, json!({}));
        let history = History::new();
        let ctx = MatchContext::new(&event, &[], &history);
        let targets: Vec<&str> = nfa
            .matching_targets("S0", &ctx)
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(targets, vec!["S1a", "S1b"]);
        assert!(nfa.matching_targets("S1a", &ctx).is_empty());
    }

    #[test]
    fn test_labeled_state() {
        let nfa = NfaBuilder::new("labels")
            .start("S0")
            .labeled_state("S1", "login", true)
            .transition("S0", "S1", always())
            .build()
            .unwrap();
        assert_eq!(nfa.state("S1").unwrap().label, "login");
    }

    #[test]
    fn test_build_validation() {
        let missing_start = NfaBuilder::new("x").state("S1").build();
        assert!(matches!(missing_start, Err(NfaError::Definition { .. })));

        let dangling = NfaBuilder::new("x")
            .start("S0")
            .transition("S0", "S9", always())
            .build();
        assert!(matches!(dangling, Err(NfaError::Definition { .. })));

        let duplicate = NfaBuilder::new("x").start("S0").state("S0").build();
        assert!(matches!(duplicate, Err(NfaError::Definition { .. })));

        let bad_fork = NfaBuilder::new("x")
            .start("S0")
            .on_fork("S7", ForkPolicy::Halt)
            .build();
        assert!(matches!(bad_fork, Err(NfaError::Definition { .. })));
    }

    #[test]
    fn test_fork_policy_defaults_to_retain() {
        let nfa = NfaBuilder::new("x")
            .start("S0")
            .state("S1")
            .on_fork("S1", ForkPolicy::Halt)
            .build()
            .unwrap();
        assert_eq!(nfa.fork_policy("S0"), ForkPolicy::Retain);
        assert_eq!(nfa.fork_policy("S1"), ForkPolicy::Halt);
    }
}
