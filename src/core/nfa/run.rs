// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run - one in-flight traversal of an automaton
//!
//! A run is Active while its current state is non-final, Final once it
//! reaches a final state, and Halted after [`Run::set_halt`]. Halted is
//! terminal: every mutating call on a halted run fails.
//!
//! Runs never call into their handler directly. [`Run::process`] mutates the
//! run in place and returns the [`RunSignal`]s the owning handler must apply,
//! in order: transitions to relay, clones to spawn, a final match to emit,
//! or a halt to clean up.

use super::definition::{ForkPolicy, Nfa};
use super::predicate::MatchContext;
use super::version::Version;
use crate::core::error::{NfaError, NfaResult};
use crate::core::event::{CompositeEvent, EventRef, History};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Request from a run to its handler
#[derive(Debug, Clone, PartialEq)]
pub enum RunSignal {
    Transition {
        state_name_from: String,
        state_name_to: String,
        event: EventRef,
    },
    /// Spawn a child of this run at `state_name`, seeded with `event`
    Clone { state_name: String, event: EventRef },
    /// The run reached a final state with this history
    Final { history: History },
    Halt,
}

/// Serializable view of a run, enough to reconstruct its lineage and position
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: String,
    pub version: Version,
    pub parent_run_id: Option<String>,
    pub current_state: String,
    pub repeat_count: u32,
    pub halted: bool,
    pub last_proceed_had_clone: bool,
    pub event_id: u64,
    pub history: History,
}

pub struct Run {
    id: String,
    nfa: Arc<Nfa>,
    current_state: String,
    version: Version,
    parent_run_id: Option<String>,
    event: EventRef,
    history: History,
    halted: bool,
    repeat_count: u32,
    clone_count: u32,
    last_proceed_had_clone: bool,
}

impl Run {
    /// Create a run at `state_name`, seeded with `event`.
    ///
    /// `inherited` is the history carried over from a parent run; the seed
    /// event is recorded on top of it under the state's label.
    pub fn new(
        nfa: Arc<Nfa>,
        state_name: &str,
        version: Version,
        parent_run_id: Option<String>,
        event: EventRef,
        inherited: History,
    ) -> NfaResult<Self> {
        Self::with_id(
            Uuid::new_v4().to_string(),
            nfa,
            state_name,
            version,
            parent_run_id,
            event,
            inherited,
        )
    }

    /// Like [`Run::new`] with a caller-chosen id
    pub fn with_id(
        id: impl Into<String>,
        nfa: Arc<Nfa>,
        state_name: &str,
        version: Version,
        parent_run_id: Option<String>,
        event: EventRef,
        inherited: History,
    ) -> NfaResult<Self> {
        let label = nfa.require_state(state_name)?.label.clone();
        Ok(Self {
            id: id.into(),
            current_state: state_name.to_string(),
            version,
            parent_run_id,
            history: inherited.with_event(&label, event.clone()),
            event,
            nfa,
            halted: false,
            repeat_count: 0,
            clone_count: 0,
            last_proceed_had_clone: false,
        })
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_nfa(&self) -> &Arc<Nfa> {
        &self.nfa
    }

    pub fn get_current_state(&self) -> &str {
        &self.current_state
    }

    /// History label of the current state
    pub fn get_current_label(&self) -> &str {
        self.nfa
            .state(&self.current_state)
            .map(|state| state.label.as_str())
            .unwrap_or(&self.current_state)
    }

    pub fn get_version(&self) -> &Version {
        &self.version
    }

    pub fn get_parent_run_id(&self) -> Option<&str> {
        self.parent_run_id.as_deref()
    }

    /// Most recent event that advanced this run
    pub fn get_event(&self) -> &EventRef {
        &self.event
    }

    pub fn get_history(&self) -> &History {
        &self.history
    }

    pub fn get_repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn is_final(&self) -> bool {
        self.nfa.is_final(&self.current_state)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn last_proceed_had_clone(&self) -> bool {
        self.last_proceed_had_clone
    }

    pub(crate) fn mark_clone(&mut self) {
        self.last_proceed_had_clone = true;
    }

    /// Version for the next child of this run
    pub(crate) fn next_clone_version(&mut self) -> Version {
        let version = self.version.child(self.clone_count);
        self.clone_count += 1;
        version
    }

    /// Evaluate `event` against the current state's outgoing edges.
    ///
    /// No matching edge leaves the run untouched. A single matching edge
    /// advances the run in place (a self-edge counts a repeat) and, if the new
    /// state is final, requests finalization. Several matching edges request
    /// one clone per target; the run then halts if its state forks with
    /// [`ForkPolicy::Halt`].
    pub fn process(&mut self, event: &EventRef, recent: &[CompositeEvent]) -> NfaResult<Vec<RunSignal>> {
        if self.halted {
            return Err(NfaError::run_halted(self.nfa.get_name(), &self.id, "process events"));
        }

        let targets: Vec<String> = {
            let ctx = MatchContext::new(event, recent, &self.history);
            self.nfa
                .matching_targets(&self.current_state, &ctx)
                .into_iter()
                .map(|state| state.name.clone())
                .collect()
        };

        let mut signals = Vec::new();
        match targets.as_slice() {
            [] => {}
            [target] => {
                let from = self.current_state.clone();
                let increment = *target == from;
                if let Some(signal) = self.proceed(event.clone(), &from, target, increment, true)? {
                    signals.push(signal);
                }
                if self.is_final() {
                    signals.push(RunSignal::Final {
                        history: self.history.clone(),
                    });
                }
            }
            _ => {
                for target in &targets {
                    signals.push(RunSignal::Clone {
                        state_name: target.clone(),
                        event: event.clone(),
                    });
                }
                self.last_proceed_had_clone = true;
                if self.nfa.fork_policy(&self.current_state) == ForkPolicy::Halt {
                    if let Some(signal) = self.set_halt(true)? {
                        signals.push(signal);
                    }
                }
            }
        }
        Ok(signals)
    }

    /// Move from `original_state` to `target_state`, recording `event`.
    ///
    /// Fails if the run is halted or no longer in `original_state`. With
    /// `increment` the run stays put and its repeat counter advances. Returns
    /// the transition signal when `notify` is set.
    pub fn proceed(
        &mut self,
        event: EventRef,
        original_state: &str,
        target_state: &str,
        increment: bool,
        notify: bool,
    ) -> NfaResult<Option<RunSignal>> {
        if self.halted {
            return Err(NfaError::run_halted(self.nfa.get_name(), &self.id, "proceed"));
        }
        if self.current_state != original_state {
            return Err(NfaError::state_mismatch(
                self.nfa.get_name(),
                &self.id,
                original_state,
                &self.current_state,
            ));
        }
        let label = self.nfa.require_state(target_state)?.label.clone();

        if increment {
            self.repeat_count += 1;
        } else {
            self.current_state = target_state.to_string();
            self.repeat_count = 0;
        }
        self.history = self.history.with_event(&label, event.clone());
        self.event = event.clone();
        self.last_proceed_had_clone = false;

        Ok(notify.then(|| RunSignal::Transition {
            state_name_from: original_state.to_string(),
            state_name_to: target_state.to_string(),
            event,
        }))
    }

    /// Halt the run. Halting twice is an error.
    pub fn set_halt(&mut self, notify: bool) -> NfaResult<Option<RunSignal>> {
        if self.halted {
            return Err(NfaError::already_halted(self.nfa.get_name(), &self.id));
        }
        self.halted = true;
        Ok(notify.then_some(RunSignal::Halt))
    }

    pub fn to_snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id.clone(),
            version: self.version.clone(),
            parent_run_id: self.parent_run_id.clone(),
            current_state: self.current_state.clone(),
            repeat_count: self.repeat_count,
            halted: self.halted,
            last_proceed_had_clone: self.last_proceed_had_clone,
            event_id: self.event.get_id(),
            history: self.history.clone(),
        }
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("nfa", &self.nfa.get_name())
            .field("current_state", &self.current_state)
            .field("version", &self.version.get_version_as_str())
            .field("parent_run_id", &self.parent_run_id)
            .field("halted", &self.halted)
            .finish()
    }
}
