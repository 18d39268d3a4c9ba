// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide nanosecond clock
//!
//! Timestamps are anchored to the wall clock once, on first use, and then
//! advanced by a monotonic [`Instant`]. A shared high-water mark makes every
//! returned value strictly greater than the previous one, across threads, so
//! composite events produced back to back never share a timestamp.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

struct ClockAnchor {
    epoch_nanos: u64,
    started: Instant,
}

static ANCHOR: Lazy<ClockAnchor> = Lazy::new(|| ClockAnchor {
    epoch_nanos: chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0),
    started: Instant::now(),
});

static LAST: AtomicU64 = AtomicU64::new(0);

/// Current timestamp in nanoseconds since the Unix epoch, strictly increasing.
pub fn now_nanos() -> u64 {
    let elapsed = ANCHOR.started.elapsed().as_nanos() as u64;
    let candidate = ANCHOR.epoch_nanos.saturating_add(elapsed);

    let mut last = LAST.load(Ordering::Acquire);
    loop {
        let next = candidate.max(last.saturating_add(1));
        match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}
