//! Restart policies.
//!
//! - [`RestartPolicy`] restart budget plus backoff
//! - [`BackoffPolicy`] delay growth (first / factor / max + jitter)
//! - [`JitterPolicy`] randomisation of a delay
//!
//! ```text
//! ProcessManager::restart()
//!   ├─ policy.allows(restart_count)?  no → RestartLimitExceeded
//!   └─ sleep(policy.delay_for(restart_count)) → relaunch
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
