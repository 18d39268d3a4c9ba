// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod composite_event;
pub mod event;
pub mod history;

pub use composite_event::CompositeEvent;
pub use event::{Event, EventRef};
pub use history::History;
