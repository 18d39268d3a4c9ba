// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod nfa;
pub mod util;

pub use error::{NfaError, NfaResult, SubscriberError};
