//! # Event subscriber trait.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue
//! (capacity via [`Subscribe::queue_capacity`]).
//!
//! ## Rules
//! - A slow subscriber only fills its own queue.
//! - Overflow drops the event for that subscriber only and publishes
//!   `EventKind::SubscriberOverflow`.
//! - A panic in `on_event` is caught and published as
//!   `EventKind::SubscriberPanicked`; the worker keeps running.
//! - Events arrive in FIFO order per subscriber.

use async_trait::async_trait;

use crate::events::Event;

/// Observer of runtime events.
///
/// Never called from the publisher's context, so blocking here cannot stall
/// the control loop or the heartbeat. Still, use async I/O.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    ///
    /// The default is `type_name::<Self>()`, which is verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity; clamped to at least 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
