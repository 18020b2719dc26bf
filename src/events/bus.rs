//! # Event bus.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Components publish without
//! awaiting; the runtime's listener forwards everything to the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ```text
//!  ProcessManager ──┐
//!  HeartbeatMonitor ┼──► Bus ──► listener ──► SubscriberSet ──► LogWriter, ...
//!  ControlLoop ─────┤
//!  ControllerRuntime┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - Capacity is one shared ring; lagging receivers skip the oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver that observes events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
