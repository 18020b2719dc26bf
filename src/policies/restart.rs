//! # Restart budget.
//!
//! [`RestartPolicy`] caps how many times the lifecycle manager may replace
//! the worker and how long it waits before each replacement. Only
//! successful restarts consume the budget.

use std::time::Duration;

use super::backoff::BackoffPolicy;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestartPolicy {
    /// Successful restarts allowed over the manager's lifetime.
    pub max_restarts: u64,
    pub backoff: BackoffPolicy,
}

impl Default for RestartPolicy {
    /// Ten restarts, constant 500 ms backoff.
    fn default() -> Self {
        Self {
            max_restarts: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RestartPolicy {
    /// True if another restart may be attempted after `restarts` successful ones.
    pub fn allows(&self, restarts: u64) -> bool {
        restarts < self.max_restarts
    }

    pub fn delay_for(&self, restarts: u64) -> Duration {
        self.backoff.delay_for(restarts)
    }
}
