//! # algovisor
//!
//! **Algovisor** supervises a long-running compute worker process over a
//! framed loopback TCP link, keeps a real-time control loop fed with the
//! worker's output, and degrades and recovers safely when the worker
//! misbehaves or dies.
//!
//! ## Architecture
//! ```text
//!   SensorPipeline ──DoubleBufferChannel──► ControlLoop ──► Actuator
//!                                              │  ▲              │
//!                                  SensorFrame │  │ AlgoResult   ▼
//!                                              ▼  │         StatusSink ◄── ControllerRuntime
//!   HeartbeatMonitor ── Ping/Pong ──► Client ══════ TCP ══════ Server ──► WorkerService
//!                                      ▲                       (Pong answered inline)
//!   ProcessManager ── spawn + readiness ┘
//!
//!   every component ── publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Supervision
//! ```text
//! ControllerRuntime (tick)
//!   ├─ Lifecycle::ensure_connected ──fail──► Degraded / Disconnected / IpcConnectFailed
//!   ├─ HeartbeatMonitor::healthy  ──► control loop started once
//!   └─ unhealthy past grace × threshold ──► Lifecycle::restart ──limit──► latched Degraded
//! ```
//!
//! ## Features
//! | Area            | Description                                                    | Key types                                    |
//! |-----------------|----------------------------------------------------------------|----------------------------------------------|
//! | **Wire**        | Fixed-layout big-endian frames with a magic/version fence.    | [`wire::Message`], [`ProtocolError`]         |
//! | **Transport**   | One connection per endpoint, per-type inboxes, inline pongs.  | [`Client`], [`Server`], [`WorkerLink`]       |
//! | **Lifecycle**   | Start, readiness handshake, bounded restart with backoff.     | [`ProcessManager`], [`Lifecycle`]            |
//! | **Heartbeat**   | Debounced liveness with late-pong tolerance.                   | [`HeartbeatMonitor`]                         |
//! | **Control**     | Sensor-driven loop with last-known-good fallback.              | [`ControlLoop`]                              |
//! | **Runtime**     | Grace period and restart hysteresis state machine.             | [`ControllerRuntime`], [`RuntimeBuilder`]    |
//! | **Events**      | Structured events fanned out to isolated subscribers.          | [`Event`], [`Subscribe`], [`LogWriter`]      |
//!
//! ## Example
//! ```
//! use algovisor::{Event, EventKind, LifecycleError, ProtocolError};
//!
//! let ev = Event::new(EventKind::RestartLimitReached).with_attempt(10);
//! assert_eq!(ev.attempt, Some(10));
//!
//! let err = LifecycleError::RestartLimitExceeded { max: 10 };
//! assert!(err.is_terminal());
//! assert!(ProtocolError::BadMagic { found: 0 }.breaks_framing());
//! ```

mod clock;
mod config;
mod error;
mod events;
mod logging;
mod policies;
mod runtime;
mod signal;
mod snapshot;
mod status;
mod subscribers;

pub mod control;
pub mod fault;
pub mod heartbeat;
pub mod lifecycle;
pub mod sensor;
pub mod transport;
pub mod wire;
pub mod worker;

#[cfg(test)]
mod testkit;

// ---- Public re-exports ----

pub use clock::now_ns;
pub use config::{Config, SupervisionConfig};
pub use control::{ActuatorSimulator, ControlConfig, ControlLoop};
pub use error::{LifecycleError, ProtocolError};
pub use events::{Bus, Event, EventKind};
pub use heartbeat::{HealthState, HeartbeatConfig, HeartbeatMonitor};
pub use lifecycle::{Lifecycle, ProcessLauncher, ProcessManager, ReadinessSignal, WorkerCommand};
pub use logging::init_logging;
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use runtime::{ControllerRuntime, RuntimeBuilder};
pub use signal::wait_for_shutdown_signal;
pub use snapshot::DoubleBufferChannel;
pub use status::{AlgoHealth, ErrorCode, StatusSink, StatusStore, SystemState, SystemStatus};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use transport::{Client, Server, WorkerLink};
pub use worker::{WorkerConfig, WorkerExit, WorkerService};
