//! Runtime events: data model and broadcast bus.
//!
//! - [`EventKind`], [`Event`] what happened, with optional metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! Publishers: `ProcessManager`, `HeartbeatMonitor`, `ControlLoop`,
//! `ControllerRuntime`, `SubscriberSet` workers.
//! Consumer: the runtime's listener task, which fans out to subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
