// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod handler_config;

pub use handler_config::{HandlerConfig, DEFAULT_MAX_RECENT, ENV_MAX_RECENT};
