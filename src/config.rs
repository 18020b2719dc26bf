//! # Controller configuration.
//!
//! [`Config`] gathers every tunable of the controller side. Sub-structs
//! own their concern and carry their own defaults; `Config::default()`
//! reproduces the stock deployment.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use algovisor::{BackoffPolicy, Config, JitterPolicy};
//!
//! let mut cfg = Config::default();
//! cfg.heartbeat.pong_tolerance = 4;
//! cfg.restart.max_restarts = 3;
//! cfg.restart.backoff = BackoffPolicy {
//!     factor: 2.0,
//!     jitter: JitterPolicy::Equal,
//!     ..BackoffPolicy::default()
//! };
//! cfg.supervision.connection_grace = Duration::from_secs(5);
//!
//! assert_eq!(cfg.lifecycle().restart.max_restarts, 3);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use crate::control::ControlConfig;
use crate::heartbeat::HeartbeatConfig;
use crate::lifecycle::{LifecycleConfig, WorkerCommand};
use crate::policies::RestartPolicy;

/// Timing of the runtime's supervisor loop.
#[derive(Debug, Clone, Copy)]
pub struct SupervisionConfig {
    /// Pause between supervisor iterations.
    pub tick: Duration,
    /// Pause after a failed `ensure_connected`.
    pub reconnect_delay: Duration,
    /// Pause after a restart attempt, whatever its outcome.
    pub settle_delay: Duration,
    /// Window after (re)connecting in which heartbeat misses are tolerated.
    pub connection_grace: Duration,
    /// Consecutive unhealthy iterations that trigger a restart.
    pub unhealthy_restart_threshold: u32,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(200),
            connection_grace: Duration::from_secs(2),
            unhealthy_restart_threshold: 3,
        }
    }
}

/// Everything the controller runtime needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_addr: SocketAddr,
    pub connect_timeout: Duration,
    /// Bound on the worker's readiness handshake.
    pub ready_timeout: Duration,
    pub worker: WorkerCommand,
    pub restart: RestartPolicy,
    pub heartbeat: HeartbeatConfig,
    pub control: ControlConfig,
    pub supervision: SupervisionConfig,
    /// Rate of the built-in sensor generator.
    pub sensor_rate_hz: f64,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            worker_addr: lifecycle.worker_addr,
            connect_timeout: lifecycle.connect_timeout,
            ready_timeout: lifecycle.ready_timeout,
            worker: WorkerCommand::default(),
            restart: lifecycle.restart,
            heartbeat: HeartbeatConfig::default(),
            control: ControlConfig::default(),
            supervision: SupervisionConfig::default(),
            sensor_rate_hz: 200.0,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// The slice of settings the process manager uses.
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            worker_addr: self.worker_addr,
            connect_timeout: self.connect_timeout,
            ready_timeout: self.ready_timeout,
            restart: self.restart,
        }
    }

    /// Bus capacity, at least 1.
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}
