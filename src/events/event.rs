//! # Events emitted by the supervision core.
//!
//! [`EventKind`] groups what happened into four families:
//! - **Worker lifecycle**: launch, readiness, connect, restart, terminate
//! - **Heartbeat**: misses, late pongs, health lost/restored
//! - **Control/runtime**: control loop start/stop, externally visible state changes
//! - **Subscriber plumbing**: overflow and panics of observers
//!
//! [`Event`] carries a global sequence number, a wall-clock timestamp for
//! logs, and optional metadata depending on the kind.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use algovisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(500))
//!     .with_reason("heartbeat lost");
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.delay_ms, Some(500));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::status::{AlgoHealth, ErrorCode, SystemState};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker lifecycle ===
    /// Worker executable is being spawned.
    ///
    /// Sets: `reason` (program path).
    WorkerLaunching,

    /// Readiness handshake completed.
    ///
    /// Sets: `pid`.
    WorkerReady,

    /// Spawn or handshake failed.
    ///
    /// Sets: `reason` (error label and message), `timeout_ms` for handshake timeouts.
    WorkerStartFailed,

    /// Transport connected to the worker.
    ///
    /// Sets: `addr`.
    WorkerConnected,

    /// Connect attempt failed (before or after starting a process).
    ///
    /// Sets: `addr`, `timeout_ms`.
    WorkerConnectFailed,

    /// Child process exited without being asked to.
    ///
    /// Sets: `pid`, `reason` (exit status).
    WorkerExited,

    /// Child process was killed and reaped.
    ///
    /// Sets: `pid`.
    WorkerTerminated,

    /// A restart is about to sleep its backoff.
    ///
    /// Sets: `attempt` (restart number about to be made), `delay_ms`.
    RestartScheduled,

    /// Restart completed and the transport is connected again.
    ///
    /// Sets: `attempt` (new restart count).
    RestartSucceeded,

    /// Restart attempt failed; the count is unchanged.
    ///
    /// Sets: `attempt`, `reason`.
    RestartFailed,

    /// Restart refused because the budget is spent.
    ///
    /// Sets: `attempt` (current count), `reason`.
    RestartLimitReached,

    // === Heartbeat ===
    /// No acceptable pong within the heartbeat timeout.
    ///
    /// Sets: `heartbeat_seq`, `misses` (consecutive).
    HeartbeatMissed,

    /// Pong accepted that answered an earlier ping.
    ///
    /// Sets: `heartbeat_seq` (echoed), `reason` (lag in rounds).
    PongLate,

    /// Consecutive misses reached the threshold, or the link dropped.
    ///
    /// Sets: `misses`.
    HealthLost,

    /// First accepted pong after being unhealthy.
    ///
    /// Sets: `heartbeat_seq`.
    HealthRestored,

    // === Control / runtime ===
    /// Control loop task spawned.
    ControlLoopStarted,

    /// Control loop task joined.
    ControlLoopStopped,

    /// Externally visible status triple changed.
    ///
    /// Sets: `state`, `health`, `error`, optional `reason`.
    StateChanged,

    /// Shutdown requested (OS signal or explicit stop).
    ShutdownRequested,

    // === Subscriber plumbing ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason`.
    SubscriberOverflow,

    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `reason` (panic info).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp, for logs only.
    pub at: SystemTime,
    pub kind: EventKind,

    pub reason: Option<Arc<str>>,
    /// Restart counter related to the event.
    pub attempt: Option<u64>,
    pub delay_ms: Option<u32>,
    pub timeout_ms: Option<u32>,
    pub heartbeat_seq: Option<u64>,
    pub misses: Option<u32>,
    pub pid: Option<u32>,
    pub addr: Option<SocketAddr>,
    pub state: Option<SystemState>,
    pub health: Option<AlgoHealth>,
    pub error: Option<ErrorCode>,
}

fn clamp_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            reason: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            heartbeat_seq: None,
            misses: None,
            pid: None,
            addr: None,
            state: None,
            health: None,
            error: None,
        }
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Stored as milliseconds.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(clamp_ms(d));
        self
    }

    /// Stored as milliseconds.
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(clamp_ms(d));
        self
    }

    #[inline]
    pub fn with_heartbeat_seq(mut self, seq: u64) -> Self {
        self.heartbeat_seq = Some(seq);
        self
    }

    #[inline]
    pub fn with_misses(mut self, misses: u32) -> Self {
        self.misses = Some(misses);
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    #[inline]
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Attaches the externally visible status triple.
    #[inline]
    pub fn with_status(mut self, state: SystemState, health: AlgoHealth, error: ErrorCode) -> Self {
        self.state = Some(state);
        self.health = Some(health);
        self.error = Some(error);
        self
    }

    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    /// Subscriber plumbing events are not re-fanned to subscribers.
    #[inline]
    pub fn is_subscriber_internal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::WorkerReady);
        let b = Event::new(EventKind::WorkerReady);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn long_durations_saturate() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn status_triple_is_attached() {
        let ev = Event::new(EventKind::StateChanged).with_status(
            SystemState::Degraded,
            AlgoHealth::Disconnected,
            ErrorCode::IpcConnectFailed,
        );
        assert_eq!(ev.state, Some(SystemState::Degraded));
        assert_eq!(ev.error, Some(ErrorCode::IpcConnectFailed));
        assert!(!ev.is_subscriber_internal());
    }
}
