//! # Shared system status.
//!
//! [`SystemStatus`] is the single externally visible snapshot. The runtime
//! and the control loop write disjoint fields through [`StatusSink::modify`];
//! readers receive whole copies.
//!
//! ## Rules
//! - One lock guards the whole struct; a read never mixes fields from two writes.
//! - References are never handed out across tasks, only copies.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Externally visible lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    #[default]
    Starting,
    Running,
    Degraded,
    Stopping,
    Stopped,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Starting => "starting",
            SystemState::Running => "running",
            SystemState::Degraded => "degraded",
            SystemState::Stopping => "stopping",
            SystemState::Stopped => "stopped",
        }
    }
}

/// Health of the worker as judged by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlgoHealth {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Disconnected,
}

impl AlgoHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            AlgoHealth::Unknown => "unknown",
            AlgoHealth::Healthy => "healthy",
            AlgoHealth::Unhealthy => "unhealthy",
            AlgoHealth::Disconnected => "disconnected",
        }
    }
}

/// Last error reported to the presentation layer. Numeric values are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ErrorCode {
    #[default]
    Ok = 0,
    ConfigLoadFailed = 1000,
    IpcConnectFailed = 2000,
    HeartbeatTimeout = 2100,
    AlgoCrashed = 2200,
    RestartLimitExceeded = 2300,
    SafetyLimitExceeded = 3000,
    ManualEStop = 3100,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::ConfigLoadFailed => "config_load_failed",
            ErrorCode::IpcConnectFailed => "ipc_connect_failed",
            ErrorCode::HeartbeatTimeout => "heartbeat_timeout",
            ErrorCode::AlgoCrashed => "algo_crashed",
            ErrorCode::RestartLimitExceeded => "restart_limit_exceeded",
            ErrorCode::SafetyLimitExceeded => "safety_limit_exceeded",
            ErrorCode::ManualEStop => "manual_estop",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}

/// Full status snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemStatus {
    pub system_state: SystemState,
    pub algo_health: AlgoHealth,
    pub last_error: ErrorCode,
    pub last_error_message: String,

    pub sensor_seq: u64,
    pub sensor_rate_hz: f64,
    pub sensor_missed_deadlines: u64,
    pub control_loop_hz: f64,

    pub heartbeat_rtt_ms: f64,
    pub heartbeat_timeouts: u64,
    pub algo_restarts: u64,

    pub last_command: f64,
    pub actuator_position: f64,
    pub actuator_velocity: f64,
    pub algo_latency_ms: f64,
}

/// Where status snapshots are written and read.
pub trait StatusSink: Send + Sync + 'static {
    /// Replaces the whole snapshot.
    fn update(&self, status: SystemStatus);

    /// Copy of the current snapshot.
    fn read(&self) -> SystemStatus;

    /// Read-modify-write under one lock.
    fn modify(&self, f: &mut dyn FnMut(&mut SystemStatus));
}

/// In-memory [`StatusSink`].
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: Mutex<SystemStatus>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SystemStatus> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl StatusSink for StatusStore {
    fn update(&self, status: SystemStatus) {
        *self.lock() = status;
    }

    fn read(&self) -> SystemStatus {
        self.lock().clone()
    }

    fn modify(&self, f: &mut dyn FnMut(&mut SystemStatus)) {
        f(&mut self.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_in_starting_state() {
        let store = StatusStore::new();
        let s = store.read();
        assert_eq!(s.system_state, SystemState::Starting);
        assert_eq!(s.algo_health, AlgoHealth::Unknown);
        assert_eq!(s.last_error, ErrorCode::Ok);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::IpcConnectFailed.code(), 2000);
        assert_eq!(ErrorCode::HeartbeatTimeout.code(), 2100);
        assert_eq!(ErrorCode::ManualEStop.code(), 3100);
        assert_eq!(ErrorCode::HeartbeatTimeout.to_string(), "heartbeat_timeout(2100)");
    }

    #[test]
    fn concurrent_modifies_keep_disjoint_fields() {
        let store = Arc::new(StatusStore::new());
        let a = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    store.modify(&mut |s| s.sensor_seq = i);
                }
            })
        };
        let b = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    store.modify(&mut |s| s.algo_restarts = i);
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        let s = store.read();
        assert_eq!(s.sensor_seq, 999);
        assert_eq!(s.algo_restarts, 999);
    }
}
