// SPDX-License-Identifier: MIT OR Apache-2.0

//! EventFlux NFA Error Types
//!
//! Every variant that references a run or a state carries the automaton name
//! and the identifiers involved, so a failed `process` or `force_run_*` call
//! can be traced back to the run and transition that triggered it.
//!
//! These are bookkeeping errors: the handler's view of its runs has diverged
//! from the automaton definition. They are never swallowed. Subscriber
//! callback failures use [`SubscriberError`] instead and are isolated by the
//! subscriber set.

use thiserror::Error;

/// Result type for NFA runtime operations
pub type NfaResult<T> = Result<T, NfaError>;

/// Error returned by a subscriber callback. Logged, never propagated.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// NFA runtime error types
#[derive(Error, Debug)]
pub enum NfaError {
    #[error("[{nfa_name}] no run found with id '{run_id}'")]
    UnknownRun { nfa_name: String, run_id: String },

    #[error("[{nfa_name}] unknown state '{state_name}'")]
    UnknownState {
        nfa_name: String,
        state_name: String,
    },

    #[error("[{nfa_name}] run '{run_id}' already exists")]
    DuplicateRun { nfa_name: String, run_id: String },

    #[error("[{nfa_name}] run '{run_id}' cannot take version {version}, already held by run '{holder_run_id}'")]
    DuplicateVersion {
        nfa_name: String,
        run_id: String,
        version: String,
        holder_run_id: String,
    },

    #[error("[{nfa_name}] no parent run found (parent_run_id: {parent_run_id:?}, state: '{state_name}')")]
    MissingParent {
        nfa_name: String,
        parent_run_id: Option<String>,
        state_name: String,
    },

    #[error("[{nfa_name}] '{state_name_to}' is not a transition target of '{state_name_from}'")]
    InvalidTransition {
        nfa_name: String,
        state_name_from: String,
        state_name_to: String,
    },

    #[error(
        "[{nfa_name}] run '{run_id}' is in state '{current_state}', expected '{expected_state}'"
    )]
    StateMismatch {
        nfa_name: String,
        run_id: String,
        expected_state: String,
        current_state: String,
    },

    #[error("[{nfa_name}] run '{run_id}' is already halted")]
    AlreadyHalted { nfa_name: String, run_id: String },

    #[error("[{nfa_name}] run '{run_id}' is halted and cannot {operation}")]
    RunHalted {
        nfa_name: String,
        run_id: String,
        operation: String,
    },

    #[error("Invalid automaton definition '{nfa_name}': {message}")]
    Definition { nfa_name: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// Custom error creation helpers
impl NfaError {
    /// Create an unknown run error
    pub fn unknown_run(nfa_name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::UnknownRun {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
        }
    }

    /// Create an unknown state error
    pub fn unknown_state(nfa_name: impl Into<String>, state_name: impl Into<String>) -> Self {
        Self::UnknownState {
            nfa_name: nfa_name.into(),
            state_name: state_name.into(),
        }
    }

    /// Create a duplicate run error
    pub fn duplicate_run(nfa_name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::DuplicateRun {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
        }
    }

    /// Create a version collision error
    pub fn duplicate_version(
        nfa_name: impl Into<String>,
        run_id: impl Into<String>,
        version: impl Into<String>,
        holder_run_id: impl Into<String>,
    ) -> Self {
        Self::DuplicateVersion {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
            version: version.into(),
            holder_run_id: holder_run_id.into(),
        }
    }

    /// Create a missing parent error
    pub fn missing_parent(
        nfa_name: impl Into<String>,
        parent_run_id: Option<&str>,
        state_name: impl Into<String>,
    ) -> Self {
        Self::MissingParent {
            nfa_name: nfa_name.into(),
            parent_run_id: parent_run_id.map(str::to_string),
            state_name: state_name.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        nfa_name: impl Into<String>,
        state_name_from: impl Into<String>,
        state_name_to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            nfa_name: nfa_name.into(),
            state_name_from: state_name_from.into(),
            state_name_to: state_name_to.into(),
        }
    }

    /// Create a state mismatch error
    pub fn state_mismatch(
        nfa_name: impl Into<String>,
        run_id: impl Into<String>,
        expected_state: impl Into<String>,
        current_state: impl Into<String>,
    ) -> Self {
        Self::StateMismatch {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
            expected_state: expected_state.into(),
            current_state: current_state.into(),
        }
    }

    /// Create an already halted error
    pub fn already_halted(nfa_name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::AlreadyHalted {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
        }
    }

    /// Create a run halted error for an operation attempted on a halted run
    pub fn run_halted(
        nfa_name: impl Into<String>,
        run_id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::RunHalted {
            nfa_name: nfa_name.into(),
            run_id: run_id.into(),
            operation: operation.into(),
        }
    }

    /// Create an automaton definition error
    pub fn definition(nfa_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Definition {
            nfa_name: nfa_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(message: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Run id this error refers to, if any
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::UnknownRun { run_id, .. }
            | Self::DuplicateRun { run_id, .. }
            | Self::DuplicateVersion { run_id, .. }
            | Self::StateMismatch { run_id, .. }
            | Self::AlreadyHalted { run_id, .. }
            | Self::RunHalted { run_id, .. } => Some(run_id),
            Self::MissingParent { parent_run_id, .. } => parent_run_id.as_deref(),
            _ => None,
        }
    }
}
