//! # Worker process lifecycle.
//!
//! - [`ProcessManager`] start, readiness handshake, bounded restart
//! - [`Launch`] / [`WorkerProcess`] seam between the manager and the OS
//! - [`ReadinessSignal`] / [`ReadyNotifier`] the two handshake mechanisms
//!
//! [`Lifecycle`] is what the controller runtime drives; it never sees
//! process handles or I/O errors beyond [`LifecycleError`].

mod manager;
mod process;
pub mod readiness;

use async_trait::async_trait;

use crate::error::LifecycleError;

pub use manager::{LifecycleConfig, LifecycleState, ProcessManager};
pub use process::{Launch, ProcessLauncher, WorkerCommand, WorkerProcess};
pub use readiness::{READY_BYTE, ReadinessSignal, ReadyNotifier};

/// Keeps a connected worker available to the controller.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Connects to a running worker, starting one if nothing answers.
    async fn ensure_connected(&self) -> Result<(), LifecycleError>;

    /// Replaces the worker. Fails with [`LifecycleError::RestartLimitExceeded`]
    /// once the budget is spent.
    async fn restart(&self) -> Result<(), LifecycleError>;

    /// Successful restarts so far.
    fn restart_count(&self) -> u64;

    /// Disconnects and reaps the child, if any.
    async fn shutdown(&self);
}
