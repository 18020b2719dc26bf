//! # Event subscribers.
//!
//! The runtime's listener task drains the [`Bus`](crate::events::Bus) and
//! hands every event to a [`SubscriberSet`], which fans it out to each
//! [`Subscribe`] implementation on its own queue and worker task.
//!
//! ```text
//!   ProcessManager ─┐
//!   HeartbeatMonitor┼─ publish ──► Bus ──► listener ──► SubscriberSet
//!   ControlLoop ────┤                                   ├─► [queue] ─► LogWriter
//!   ControllerRuntime                                   └─► [queue] ─► custom ...
//! ```
//!
//! ## Implementing a subscriber
//! ```no_run
//! use algovisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct RestartCounter;
//!
//! #[async_trait]
//! impl Subscribe for RestartCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RestartSucceeded {
//!             // bump a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "restart-counter"
//!     }
//! }
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
