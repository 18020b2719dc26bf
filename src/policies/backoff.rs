//! # Restart backoff.
//!
//! [`BackoffPolicy`] computes how long the lifecycle manager waits between
//! tearing a worker down and launching its replacement.
//!
//! The delay for restart `n` (0-based, i.e. the current restart count) is
//! `first × factor^n`, clamped to `max`, then jittered. The stock policy has
//! `factor = 1.0`, a constant delay.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use algovisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(250),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(0), Duration::from_millis(250));
//! assert_eq!(backoff.delay_for(2), Duration::from_secs(1));
//! assert_eq!(backoff.delay_for(9), Duration::from_secs(2));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per restart; `1.0` keeps the delay constant.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 500 ms, capped at 10 s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(10),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay without jitter.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before restart number `restarts + 1`.
    ///
    /// Derived from the restart count alone, so jitter never compounds.
    pub fn delay_for(&self, restarts: u64) -> Duration {
        let exp = restarts.min(i32::MAX as u64) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
