// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Handler - owner of the live runs of one automaton
//!
//! The handler routes every incoming event to all live runs and to the start
//! state, spawns clones, turns final runs into [`CompositeEvent`]s, removes
//! halted runs and notifies subscribers.
//!
//! ## Locking
//!
//! Every public method takes the handler's single mutex once and delegates to
//! `HandlerCore`, whose methods take `&mut self` and call each other
//! directly. A clone spawned while processing an event
//! (`process -> Run::process -> on_run_clone -> add_run`) therefore runs
//! inside the same critical section without re-acquiring the lock. Events
//! are fully serialized per handler; separate handlers share nothing but the
//! automaton definition, which is immutable.
//!
//! ## History accumulation
//!
//! A clone inherits its parent's history and records its seed event on top,
//! and a run that reaches a final state by advancing reports everything
//! matched along its lineage. A clone spawned directly into a final state
//! reports only `{label: [event]}`, whether or not it has a parent.
//!
//! ## Versions
//!
//! No two live runs share a version: versions key the match buffer, so
//! removing one run must never release another run's entries.

use super::definition::Nfa;
use super::predicate::MatchContext;
use super::run::{Run, RunSignal, RunSnapshot};
use super::subscriber::{HandlerNotification, HandlerSubscriber, SubscriberSet};
use super::version::Version;
use crate::core::buffer::{InMemoryMatchBuffer, MatchBuffer};
use crate::core::config::HandlerConfig;
use crate::core::error::{NfaError, NfaResult};
use crate::core::event::{CompositeEvent, EventRef, History};
use crate::core::util::clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Serializable view of a handler. Halted runs are never included.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerSnapshot {
    pub nfa_name: String,
    pub buffer: serde_json::Value,
    pub runs: Vec<RunSnapshot>,
}

pub struct Handler {
    nfa: Arc<Nfa>,
    core: Mutex<HandlerCore>,
}

impl Handler {
    pub fn new(nfa: Arc<Nfa>, buffer: Arc<dyn MatchBuffer>, config: &HandlerConfig) -> Self {
        let max_recent = config.effective_max_recent();
        log::debug!(
            "[{}] creating handler (max_recent={})",
            nfa.get_name(),
            max_recent
        );
        Self {
            core: Mutex::new(HandlerCore {
                nfa: Arc::clone(&nfa),
                buffer,
                runs: HashMap::new(),
                recent: Vec::with_capacity(max_recent),
                max_recent,
                subscribers: SubscriberSet::new(),
                next_root: 0,
            }),
            nfa,
        }
    }

    /// Handler with an in-memory buffer and default configuration
    pub fn with_defaults(nfa: Arc<Nfa>) -> Self {
        Self::new(nfa, Arc::new(InMemoryMatchBuffer::new()), &HandlerConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, HandlerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        self.nfa.get_name()
    }

    pub fn nfa(&self) -> &Arc<Nfa> {
        &self.nfa
    }

    /// Feed one event to every live run and to the start state.
    pub fn process(&self, event: EventRef) -> NfaResult<()> {
        let mut core = self.lock();
        core.process(&event).map_err(|e| {
            log::error!(
                "[{}] processing event {} failed, runs may be inconsistent: {}",
                self.name(),
                event.get_id(),
                e
            );
            e
        })
    }

    pub fn add_run(&self, run: Run) -> NfaResult<()> {
        self.lock().add_run(run)
    }

    /// Remove a run, releasing its buffer entries. Unknown ids are ignored.
    pub fn remove_run(&self, run_id: &str, halt: bool, notify: bool) {
        self.lock().remove_run(run_id, halt, notify)
    }

    pub fn clear_runs(&self, halt: bool, notify: bool) {
        self.lock().clear_runs(halt, notify)
    }

    /// Spawn a run at `state_name` seeded with `event`. Returns the new run id.
    pub fn on_run_clone(
        &self,
        state_name: &str,
        event: EventRef,
        parent_run_id: Option<&str>,
        force_parent: bool,
        notify: bool,
    ) -> NfaResult<String> {
        self.lock()
            .on_run_clone(state_name, &event, parent_run_id, force_parent, notify)
    }

    pub fn on_run_final(
        &self,
        run_id: &str,
        history: History,
        halt: bool,
        notify: bool,
    ) -> NfaResult<CompositeEvent> {
        self.lock().on_run_final(run_id, history, halt, notify)
    }

    pub fn on_run_halt(&self, run_id: &str, notify: bool) {
        self.lock().on_run_halt(run_id, notify)
    }

    pub fn on_run_transition(
        &self,
        run_id: &str,
        state_name_from: &str,
        state_name_to: &str,
        event: EventRef,
        notify: bool,
    ) {
        self.lock()
            .on_run_transition(run_id, state_name_from, state_name_to, &event, notify)
    }

    /// Move a run between states without notifying subscribers or cloning.
    pub fn force_run_transition(
        &self,
        run_id: &str,
        state_name_from: &str,
        state_name_to: &str,
        event: EventRef,
    ) -> NfaResult<()> {
        self.lock()
            .force_run_transition(run_id, state_name_from, state_name_to, event)
    }

    pub fn force_run_clone(
        &self,
        state_name: &str,
        event: EventRef,
        parent_run_id: Option<&str>,
    ) -> NfaResult<String> {
        self.lock().force_run_clone(state_name, &event, parent_run_id)
    }

    pub fn force_run_halt(&self, run_id: &str) -> NfaResult<()> {
        self.lock().force_run_halt(run_id)
    }

    pub fn force_run_final(&self, run_id: &str, history: History) -> NfaResult<CompositeEvent> {
        self.lock().on_run_final(run_id, history, true, false)
    }

    pub fn subscribe(&self, subscriber: Arc<dyn HandlerSubscriber>) {
        let mut core = self.lock();
        if core.subscribers.insert(subscriber) {
            log::debug!("[{}] subscriber added", self.name());
        }
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn HandlerSubscriber>) {
        let mut core = self.lock();
        if core.subscribers.remove(subscriber) {
            log::debug!("[{}] subscriber removed", self.name());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn snapshot(&self) -> HandlerSnapshot {
        self.lock().snapshot()
    }

    /// JSON snapshot with keys `nfa_name`, `buffer` and `runs`
    pub fn to_dict(&self) -> NfaResult<serde_json::Value> {
        Ok(serde_json::to_value(self.snapshot())?)
    }

    pub fn run_count(&self) -> usize {
        self.lock().runs.len()
    }

    /// Ids of the live runs, ordered by version
    pub fn run_ids(&self) -> Vec<String> {
        self.lock().ordered_run_ids()
    }

    pub fn run_snapshot(&self, run_id: &str) -> Option<RunSnapshot> {
        self.lock().runs.get(run_id).map(Run::to_snapshot)
    }

    /// Recent composite events, most recent first
    pub fn recent(&self) -> Vec<CompositeEvent> {
        self.lock().recent.clone()
    }

    pub fn max_recent(&self) -> usize {
        self.lock().max_recent
    }
}

struct HandlerCore {
    nfa: Arc<Nfa>,
    buffer: Arc<dyn MatchBuffer>,
    runs: HashMap<String, Run>,
    recent: Vec<CompositeEvent>,
    max_recent: usize,
    subscribers: SubscriberSet,
    next_root: u32,
}

impl HandlerCore {
    fn name(&self) -> &str {
        self.nfa.get_name()
    }

    fn publish(&self, notification: HandlerNotification) {
        self.subscribers.publish(&notification);
    }

    fn ordered_run_ids(&self) -> Vec<String> {
        let mut ids: Vec<(&Version, &String)> = self
            .runs
            .iter()
            .map(|(id, run)| (run.get_version(), id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Id of the live run holding `version`, if any
    fn version_holder(&self, version: &Version) -> Option<&str> {
        self.runs
            .iter()
            .find(|(_, run)| run.get_version() == version)
            .map(|(id, _)| id.as_str())
    }

    /// Next root version not held by a live run. Runs added from outside may
    /// already occupy counter values, and the counter wraps.
    fn next_root_version(&mut self) -> Version {
        loop {
            let version = Version::root(self.next_root);
            self.next_root = self.next_root.wrapping_add(1);
            if self.version_holder(&version).is_none() {
                return version;
            }
        }
    }

    fn next_child_version(&mut self, parent_run_id: &str, state_name: &str) -> NfaResult<Version> {
        loop {
            let nfa_name = self.name().to_string();
            let version = self
                .runs
                .get_mut(parent_run_id)
                .ok_or_else(|| NfaError::missing_parent(nfa_name, Some(parent_run_id), state_name))?
                .next_clone_version();
            if self.version_holder(&version).is_none() {
                return Ok(version);
            }
        }
    }

    fn process(&mut self, event: &EventRef) -> NfaResult<()> {
        let recent = self.recent.clone();

        // Runs spawned while handling this event must not see it again, and
        // runs removed along the way are skipped.
        for run_id in self.ordered_run_ids() {
            let Some(run) = self.runs.get_mut(&run_id) else {
                continue;
            };
            if run.is_halted() {
                continue;
            }
            let signals = run.process(event, &recent)?;
            self.apply_signals(&run_id, signals)?;
        }

        let nfa = Arc::clone(&self.nfa);
        let start = nfa.get_start_state();
        if start.is_final {
            return Ok(());
        }
        let empty = History::new();
        let ctx = MatchContext::new(event, &recent, &empty);
        for target in nfa.matching_targets(&start.name, &ctx) {
            self.on_run_clone(&target.name, event, None, false, true)?;
        }
        Ok(())
    }

    fn apply_signals(&mut self, run_id: &str, signals: Vec<RunSignal>) -> NfaResult<()> {
        for signal in signals {
            match signal {
                RunSignal::Transition {
                    state_name_from,
                    state_name_to,
                    event,
                } => {
                    self.reserve(run_id, &state_name_to, &event);
                    self.on_run_transition(run_id, &state_name_from, &state_name_to, &event, true);
                }
                RunSignal::Clone { state_name, event } => {
                    self.on_run_clone(&state_name, &event, Some(run_id), true, true)?;
                }
                RunSignal::Final { history } => {
                    self.on_run_final(run_id, history, true, true)?;
                }
                RunSignal::Halt => self.on_run_halt(run_id, true),
            }
        }
        Ok(())
    }

    /// Record `event` in the buffer under the run's version
    fn reserve(&self, run_id: &str, state_name: &str, event: &EventRef) {
        let Some(run) = self.runs.get(run_id) else {
            return;
        };
        let label = self
            .nfa
            .state(state_name)
            .map(|state| state.label.as_str())
            .unwrap_or(state_name);
        self.buffer.put(
            self.name(),
            &run.get_version().get_version_as_str(),
            label,
            Arc::clone(event),
        );
    }

    fn add_run(&mut self, run: Run) -> NfaResult<()> {
        if self.runs.contains_key(run.get_id()) {
            return Err(NfaError::duplicate_run(self.name(), run.get_id()));
        }
        if run.is_halted() {
            return Err(NfaError::run_halted(self.name(), run.get_id(), "be added"));
        }
        if let Some(holder) = self.version_holder(run.get_version()) {
            return Err(NfaError::duplicate_version(
                self.name(),
                run.get_id(),
                run.get_version().get_version_as_str(),
                holder,
            ));
        }

        self.buffer.put(
            self.name(),
            &run.get_version().get_version_as_str(),
            run.get_current_label(),
            Arc::clone(run.get_event()),
        );
        log::debug!(
            "[{}] added run '{}' at '{}' (version {}, parent {:?})",
            self.name(),
            run.get_id(),
            run.get_current_state(),
            run.get_version(),
            run.get_parent_run_id()
        );
        self.runs.insert(run.get_id().to_string(), run);
        Ok(())
    }

    fn remove_run(&mut self, run_id: &str, halt: bool, notify: bool) {
        let Some(run) = self.runs.get_mut(run_id) else {
            return;
        };

        if halt && !run.is_halted() {
            // Cannot fail: the run was checked to be live just above.
            if let Ok(Some(RunSignal::Halt)) = run.set_halt(notify) {
                self.publish(HandlerNotification::Halt {
                    nfa_name: self.name().to_string(),
                    run_id: run_id.to_string(),
                });
            }
        }

        if let Some(run) = self.runs.remove(run_id) {
            let version = run.get_version().get_version_as_str();
            self.buffer.remove_version(self.name(), &version);
            log::debug!(
                "[{}] removed run '{}' (version {})",
                self.name(),
                run_id,
                version
            );
        }
    }

    fn clear_runs(&mut self, halt: bool, notify: bool) {
        let run_ids = self.ordered_run_ids();
        log::debug!("[{}] clearing {} runs", self.name(), run_ids.len());
        for run_id in run_ids {
            self.remove_run(&run_id, halt, notify);
        }
    }

    fn on_run_clone(
        &mut self,
        state_name: &str,
        event: &EventRef,
        parent_run_id: Option<&str>,
        force_parent: bool,
        notify: bool,
    ) -> NfaResult<String> {
        match parent_run_id {
            Some(id) if !self.runs.contains_key(id) => {
                return Err(NfaError::missing_parent(self.name(), Some(id), state_name));
            }
            None if force_parent => {
                return Err(NfaError::missing_parent(self.name(), None, state_name));
            }
            _ => {}
        }
        self.nfa.require_state(state_name)?;

        let (version, inherited) = match parent_run_id {
            Some(id) => {
                let version = self.next_child_version(id, state_name)?;
                let inherited = self
                    .runs
                    .get(id)
                    .map(|parent| parent.get_history().clone())
                    .unwrap_or_default();
                (version, inherited)
            }
            None => (self.next_root_version(), History::new()),
        };

        let run = Run::new(
            Arc::clone(&self.nfa),
            state_name,
            version,
            parent_run_id.map(str::to_string),
            Arc::clone(event),
            inherited,
        )?;
        let run_id = run.get_id().to_string();
        let is_final = run.is_final();
        let label = run.get_current_label().to_string();
        self.add_run(run)?;

        if is_final {
            let history = History::single(label, Arc::clone(event));
            self.on_run_final(&run_id, history, true, notify)?;
        } else if notify {
            self.publish(HandlerNotification::Clone {
                nfa_name: self.name().to_string(),
                run_id: run_id.clone(),
                state_name: state_name.to_string(),
                event: Arc::clone(event),
            });
        }
        Ok(run_id)
    }

    fn on_run_final(
        &mut self,
        run_id: &str,
        history: History,
        halt: bool,
        notify: bool,
    ) -> NfaResult<CompositeEvent> {
        let nfa_name = self.name().to_string();
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| NfaError::unknown_run(&nfa_name, run_id))?;
        if halt && !run.is_halted() {
            run.set_halt(false)?;
        }

        let composite = CompositeEvent::new(clock::now_nanos(), nfa_name.clone(), history);
        log::debug!(
            "[{}] run '{}' reached a final state ({} matched events)",
            nfa_name,
            run_id,
            composite.history.event_count()
        );
        if notify {
            self.publish(HandlerNotification::Final {
                nfa_name,
                run_id: run_id.to_string(),
                event: composite.clone(),
            });
        }
        self.push_recent(composite.clone());
        self.remove_run(run_id, false, false);
        Ok(composite)
    }

    /// Insert at the front, keep the list sorted newest first, cap at `max_recent`.
    fn push_recent(&mut self, composite: CompositeEvent) {
        self.recent.insert(0, composite);
        // Stable sort: the new entry stays ahead of equal timestamps.
        self.recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.recent.truncate(self.max_recent);
    }

    fn on_run_halt(&mut self, run_id: &str, notify: bool) {
        if notify {
            self.publish(HandlerNotification::Halt {
                nfa_name: self.name().to_string(),
                run_id: run_id.to_string(),
            });
        }
        self.remove_run(run_id, false, false);
    }

    fn on_run_transition(
        &self,
        run_id: &str,
        state_name_from: &str,
        state_name_to: &str,
        event: &EventRef,
        notify: bool,
    ) {
        if !notify {
            return;
        }
        self.publish(HandlerNotification::Transition {
            nfa_name: self.name().to_string(),
            run_id: run_id.to_string(),
            state_name_from: state_name_from.to_string(),
            state_name_to: state_name_to.to_string(),
            event: Arc::clone(event),
        });
    }

    fn force_run_transition(
        &mut self,
        run_id: &str,
        state_name_from: &str,
        state_name_to: &str,
        event: EventRef,
    ) -> NfaResult<()> {
        if !self.runs.contains_key(run_id) {
            return Err(NfaError::unknown_run(self.name(), run_id));
        }
        self.nfa.require_state(state_name_from)?;
        self.nfa.require_state(state_name_to)?;
        if !self.nfa.has_transition(state_name_from, state_name_to) {
            return Err(NfaError::invalid_transition(
                self.name(),
                state_name_from,
                state_name_to,
            ));
        }

        let nfa_name = self.name().to_string();
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| NfaError::unknown_run(&nfa_name, run_id))?;
        if run.get_current_state() != state_name_from {
            return Err(NfaError::state_mismatch(
                nfa_name,
                run_id,
                state_name_from,
                run.get_current_state(),
            ));
        }

        let increment = state_name_from == state_name_to;
        run.proceed(
            Arc::clone(&event),
            state_name_from,
            state_name_to,
            increment,
            false,
        )?;
        self.reserve(run_id, state_name_to, &event);
        self.on_run_transition(run_id, state_name_from, state_name_to, &event, false);
        Ok(())
    }

    fn force_run_clone(
        &mut self,
        state_name: &str,
        event: &EventRef,
        parent_run_id: Option<&str>,
    ) -> NfaResult<String> {
        let run_id = self.on_run_clone(state_name, event, parent_run_id, false, false)?;
        if let Some(parent) = parent_run_id.and_then(|id| self.runs.get_mut(id)) {
            parent.mark_clone();
        }
        Ok(run_id)
    }

    fn force_run_halt(&mut self, run_id: &str) -> NfaResult<()> {
        let nfa_name = self.name().to_string();
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| NfaError::unknown_run(&nfa_name, run_id))?;
        run.set_halt(false)?;
        self.remove_run(run_id, false, false);
        Ok(())
    }

    fn snapshot(&self) -> HandlerSnapshot {
        let runs = self
            .ordered_run_ids()
            .iter()
            .filter_map(|id| self.runs.get(id))
            .filter(|run| !run.is_halted())
            .map(Run::to_snapshot)
            .collect();
        HandlerSnapshot {
            nfa_name: self.name().to_string(),
            buffer: self.buffer.snapshot(self.name()),
            runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Event;
    use crate::core::nfa::definition::{ForkPolicy, NfaBuilder};
    use crate::core::nfa::predicate::{always, attribute_equals};
    use serde_json::json;

    fn kind(k: &str) -> EventRef {
        Event::new(json!({ "kind": k })).into_ref()
    }

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

    fn handler_with(nfa: Arc<Nfa>, max_recent: i64) -> (Handler, Arc<InMemoryMatchBuffer>) {
        let buffer = Arc::new(InMemoryMatchBuffer::new());
        let handler = Handler::new(nfa, buffer.clone(), &HandlerConfig::new(max_recent));
        (handler, buffer)
    }

    #[test]
    fn test_process_spawns_and_advances() {
        let (handler, buffer) = handler_with(two_step(), 10);

        handler.process(kind("A")).unwrap();
        assert_eq!(handler.run_count(), 1);
        let run = handler.run_snapshot(&handler.run_ids()[0]).unwrap();
        assert_eq!(run.current_state, "S1");
        assert_eq!(buffer.versions("two_step"), vec![run.version.get_version_as_str()]);

        handler.process(kind("B")).unwrap();
        assert_eq!(handler.run_count(), 0);
        assert_eq!(handler.recent().len(), 1);
        assert!(buffer.versions("two_step").is_empty());
    }

    #[test]
    fn test_add_run_rejects_duplicates_without_mutation() {
        let nfa = two_step();
        let (handler, _) = handler_with(nfa.clone(), 10);
        let make = || Run::with_id("dup", nfa.clone(), "S1", Version::root(9), None, kind("A"), History::new()).unwrap();

        handler.add_run(make()).unwrap();
        let before = handler.run_snapshot("dup").unwrap();
        let err = handler.add_run(make()).unwrap_err();

        assert!(matches!(err, NfaError::DuplicateRun { .. }));
        assert_eq!(handler.run_count(), 1);
        assert_eq!(handler.run_snapshot("dup").unwrap().history, before.history);
    }

    #[test]
    fn test_add_run_rejects_version_held_by_live_run() {
        let nfa = two_step();
        let (handler, buffer) = handler_with(nfa.clone(), 10);
        let first = Run::with_id("first", nfa.clone(), "S1", Version::root(4), None, kind("A"), History::new()).unwrap();
        let second = Run::with_id("second", nfa, "S1", Version::root(4), None, kind("A"), History::new()).unwrap();

        handler.add_run(first).unwrap();
        let err = handler.add_run(second).unwrap_err();

        assert!(matches!(err, NfaError::DuplicateVersion { .. }));
        let message = err.to_string();
        assert!(message.contains("first"));
        assert!(message.contains("second"));
        assert_eq!(handler.run_count(), 1);
        assert_eq!(buffer.entry_count("two_step", "4"), 1);
    }

    #[test]
    fn test_spawned_runs_skip_versions_taken_by_added_runs() {
        let nfa = two_step();
        let (handler, buffer) = handler_with(nfa.clone(), 10);
        let external = Run::with_id("ext", nfa.clone(), "S1", Version::root(0), None, kind("A"), History::new()).unwrap();
        handler.add_run(external).unwrap();

        handler.process(kind("A")).unwrap();
        let spawned = handler.run_ids().into_iter().find(|id| id != "ext").unwrap();
        let spawned_version = handler.run_snapshot(&spawned).unwrap().version.get_version_as_str();
        assert_ne!(spawned_version, "0");

        let child_taken = Run::with_id("ext-child", nfa, "S1", Version::root(0).child(0), None, kind("A"), History::new()).unwrap();
        handler.add_run(child_taken).unwrap();
        let child = handler.on_run_clone("S1", kind("A"), Some("ext"), true, false).unwrap();
        assert_eq!(handler.run_snapshot(&child).unwrap().version.get_version_as_str(), "0.1");

        handler.remove_run("ext", true, false);
        assert_eq!(handler.run_count(), 3);
        let versions = buffer.versions("two_step");
        assert!(versions.contains(&spawned_version));
        assert!(versions.contains(&"0.0".to_string()));
        assert!(versions.contains(&"0.1".to_string()));
        assert!(!versions.contains(&"0".to_string()));
    }

    #[test]
    fn test_add_run_rejects_halted_run() {
        let nfa = two_step();
        let (handler, _) = handler_with(nfa.clone(), 10);
        let mut run = Run::new(nfa, "S1", Version::root(0), None, kind("A"), History::new()).unwrap();
        run.set_halt(false).unwrap();
        assert!(matches!(handler.add_run(run), Err(NfaError::RunHalted { .. })));
        assert_eq!(handler.run_count(), 0);
    }

    #[test]
    fn test_on_run_clone_parent_resolution() {
        let (handler, _) = handler_with(two_step(), 10);

        let forced = handler.on_run_clone("S1", kind("A"), None, true, true);
        assert!(matches!(forced, Err(NfaError::MissingParent { .. })));

        let dangling = handler.on_run_clone("S1", kind("A"), Some("ghost"), false, true);
        assert!(matches!(dangling, Err(NfaError::MissingParent { .. })));

        let unknown = handler.on_run_clone("S9", kind("A"), None, false, true);
        assert!(matches!(unknown, Err(NfaError::UnknownState { .. })));

        assert_eq!(handler.run_count(), 0);
    }

    #[test]
    fn test_child_inherits_version_and_history() {
        let (handler, _) = handler_with(two_step(), 10);
        let a = kind("A");
        let parent = handler.on_run_clone("S1", a.clone(), None, false, true).unwrap();
        let b = kind("A");
        let child = handler.on_run_clone("S1", b.clone(), Some(parent.as_str()), true, true).unwrap();

        let parent_snapshot = handler.run_snapshot(&parent).unwrap();
        let child_snapshot = handler.run_snapshot(&child).unwrap();
        assert!(parent_snapshot.version.is_ancestor_of(&child_snapshot.version));
        assert_eq!(child_snapshot.parent_run_id.as_deref(), Some(parent.as_str()));
        assert_eq!(child_snapshot.history.get("S1"), Some(&[a, b][..]));
    }

    #[test]
    fn test_clone_into_final_state_finalizes_immediately() {
        let (handler, _) = handler_with(two_step(), 10);
        let e = kind("B");
        let run_id = handler.on_run_clone("S2", e.clone(), None, false, true).unwrap();

        assert!(handler.run_snapshot(&run_id).is_none());
        let recent = handler.recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].history, History::single("S2", e));
        assert_eq!(recent[0].name, "two_step");
    }

    #[test]
    fn test_parented_clone_into_final_state_reports_single_event() {
        let (handler, _) = handler_with(two_step(), 10);
        let parent = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();
        let e = kind("B");

        let child = handler.on_run_clone("S2", e.clone(), Some(parent.as_str()), true, true).unwrap();

        assert!(handler.run_snapshot(&child).is_none());
        assert_eq!(handler.recent()[0].history, History::single("S2", e));
        assert!(handler.run_snapshot(&parent).is_some());
    }

    #[test]
    fn test_recent_is_bounded_and_sorted() {
        let (handler, _) = handler_with(two_step(), 0);
        assert_eq!(handler.max_recent(), 1);

        for _ in 0..3 {
            handler.on_run_clone("S2", kind("B"), None, false, false).unwrap();
        }
        assert_eq!(handler.recent().len(), 1);

        let (handler, _) = handler_with(two_step(), 3);
        for _ in 0..5 {
            handler.on_run_clone("S2", kind("B"), None, false, false).unwrap();
        }
        let recent = handler.recent();
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_remove_run_is_idempotent() {
        let (handler, buffer) = handler_with(two_step(), 10);
        let run_id = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();
        assert_eq!(buffer.versions("two_step").len(), 1);

        handler.remove_run(&run_id, true, false);
        handler.remove_run(&run_id, true, false);
        assert_eq!(handler.run_count(), 0);
        assert!(buffer.versions("two_step").is_empty());
    }

    #[test]
    fn test_on_run_final_unknown_run() {
        let (handler, _) = handler_with(two_step(), 10);
        let err = handler.on_run_final("ghost", History::new(), false, true).unwrap_err();
        assert!(matches!(err, NfaError::UnknownRun { .. }));
        assert!(handler.recent().is_empty());
    }

    #[test]
    fn test_force_run_transition_checks() {
        let (handler, _) = handler_with(two_step(), 10);
        let run_id = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();

        let unknown_run = handler.force_run_transition("ghost", "S1", "S2", kind("B"));
        assert!(matches!(unknown_run, Err(NfaError::UnknownRun { .. })));

        let unknown_state = handler.force_run_transition(&run_id, "S1", "S9", kind("B"));
        assert!(matches!(unknown_state, Err(NfaError::UnknownState { .. })));

        let undeclared = handler.force_run_transition(&run_id, "S0", "S2", kind("B"));
        assert!(matches!(undeclared, Err(NfaError::InvalidTransition { .. })));

        let stale = handler.force_run_transition(&run_id, "S0", "S1", kind("A"));
        assert!(matches!(stale, Err(NfaError::StateMismatch { .. })));
        assert_eq!(handler.run_snapshot(&run_id).unwrap().current_state, "S1");

        handler.force_run_transition(&run_id, "S1", "S2", kind("B")).unwrap();
        let snapshot = handler.run_snapshot(&run_id).unwrap();
        assert_eq!(snapshot.current_state, "S2");
        assert!(handler.recent().is_empty());
    }

    #[test]
    fn test_force_run_clone_marks_parent() {
        let (handler, _) = handler_with(two_step(), 10);
        let parent = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();
        handler.force_run_clone("S1", kind("A"), Some(parent.as_str())).unwrap();

        assert!(handler.run_snapshot(&parent).unwrap().last_proceed_had_clone);
        assert_eq!(handler.run_count(), 2);
    }

    #[test]
    fn test_force_run_halt_twice_fails() {
        let (handler, _) = handler_with(two_step(), 10);
        let run_id = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();
        handler.force_run_halt(&run_id).unwrap();
        assert_eq!(handler.run_count(), 0);
        assert!(handler.force_run_halt(&run_id).is_err());
    }

    #[test]
    fn test_force_run_final() {
        let (handler, _) = handler_with(two_step(), 10);
        let run_id = handler.on_run_clone("S1", kind("A"), None, false, false).unwrap();
        let history = handler.run_snapshot(&run_id).unwrap().history;

        let composite = handler.force_run_final(&run_id, history.clone()).unwrap();
        assert_eq!(composite.history, history);
        assert_eq!(handler.run_count(), 0);
        assert_eq!(handler.recent()[0], composite);
    }

    #[test]
    fn test_fork_with_halt_policy_removes_parent() {
        let nfa = NfaBuilder::new("fork")
            .start("S0")
            .state("S1")
            .state("S2a")
            .state("S2b")
            .transition("S0", "S1", attribute_equals("kind", json!("A")))
            .transition("S1", "S2a", always())
            .transition("S1", "S2b", always())
            .on_fork("S1", ForkPolicy::Halt)
            .build()
            .unwrap();
        let (handler, _) = handler_with(nfa, 10);

        handler.process(kind("A")).unwrap();
        let parent = handler.run_ids().pop().unwrap();
        handler.process(kind("X")).unwrap();

        assert!(handler.run_snapshot(&parent).is_none());
        let children: Vec<RunSnapshot> = handler
            .run_ids()
            .iter()
            .filter_map(|id| handler.run_snapshot(id))
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children
            .iter()
            .all(|c| c.parent_run_id.as_deref() == Some(parent.as_str())));
    }

    #[test]
    fn test_start_state_that_is_final_never_spawns() {
        let nfa = NfaBuilder::new("degenerate")
            .final_state("S0")
            .start("S0")
            .transition("S0", "S0", always())
            .build()
            .unwrap();
        assert!(nfa.get_start_state().is_final);
        let (handler, _) = handler_with(nfa, 10);

        handler.process(kind("A")).unwrap();
        assert_eq!(handler.run_count(), 0);
        assert!(handler.recent().is_empty());
    }

    #[test]
    fn test_to_dict_shape() {
        let (handler, _) = handler_with(two_step(), 10);
        handler.process(kind("A")).unwrap();
        let dict = handler.to_dict().unwrap();

        let keys: Vec<&str> = dict.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["nfa_name", "buffer", "runs"]);
        assert_eq!(dict["nfa_name"], json!("two_step"));
        assert_eq!(dict["runs"].as_array().unwrap().len(), 1);
        assert_eq!(dict["runs"][0]["current_state"], json!("S1"));
    }
}
