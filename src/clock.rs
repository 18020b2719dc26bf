//! Monotonic timestamps for wire messages.
//!
//! Nanoseconds since the first call in this process. Only differences
//! between two readings of the same process are meaningful.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current monotonic time in nanoseconds.
pub fn now_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Converts a nanosecond difference to fractional milliseconds.
pub fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// Milliseconds as `f64`, for status metrics.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
