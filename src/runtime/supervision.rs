//! Per-iteration decision procedure of the supervisor loop.
//!
//! Pure bookkeeping: the caller feeds it connection and health observations
//! and acts on the returned [`Verdict`]. No I/O, no clocks of its own.

use std::time::Duration;

use tokio::time::Instant;

use crate::status::{AlgoHealth, ErrorCode, SystemState};

/// Externally visible status triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Triple {
    pub(crate) state: SystemState,
    pub(crate) health: AlgoHealth,
    pub(crate) error: ErrorCode,
}

impl Triple {
    pub(crate) const fn new(state: SystemState, health: AlgoHealth, error: ErrorCode) -> Self {
        Self {
            state,
            health,
            error,
        }
    }

    pub(crate) const RUNNING: Triple =
        Triple::new(SystemState::Running, AlgoHealth::Healthy, ErrorCode::Ok);
    pub(crate) const CONNECT_FAILED: Triple = Triple::new(
        SystemState::Degraded,
        AlgoHealth::Disconnected,
        ErrorCode::IpcConnectFailed,
    );
    pub(crate) const HEARTBEAT_TIMEOUT: Triple = Triple::new(
        SystemState::Degraded,
        AlgoHealth::Unhealthy,
        ErrorCode::HeartbeatTimeout,
    );
    pub(crate) const RESTART_LIMIT: Triple = Triple::new(
        SystemState::Degraded,
        AlgoHealth::Unhealthy,
        ErrorCode::RestartLimitExceeded,
    );
}

/// What the supervisor loop should do this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Publish the triple; start the control loop first if asked.
    Publish {
        triple: Triple,
        start_control_loop: bool,
    },
    /// Publish [`Triple::HEARTBEAT_TIMEOUT`], then restart the worker.
    Restart,
}

#[derive(Debug)]
pub(crate) struct Supervision {
    grace: Duration,
    restart_threshold: u32,

    was_connected: bool,
    grace_deadline: Option<Instant>,
    has_been_healthy: bool,
    control_loop_started: bool,
    consecutive_unhealthy: u32,
}

impl Supervision {
    pub(crate) fn new(grace: Duration, restart_threshold: u32) -> Self {
        Self {
            grace,
            restart_threshold: restart_threshold.max(1),
            was_connected: false,
            grace_deadline: None,
            has_been_healthy: false,
            control_loop_started: false,
            consecutive_unhealthy: 0,
        }
    }

    /// Forgets all connection and health history.
    pub(crate) fn reset(&mut self) {
        self.was_connected = false;
        self.grace_deadline = None;
        self.has_been_healthy = false;
        self.control_loop_started = false;
        self.consecutive_unhealthy = 0;
    }

    /// The link came back up without a restart (crash relaunch or adoption).
    /// Arms a fresh grace window and judges the worker as new; the control
    /// loop is left running.
    pub(crate) fn on_reconnected(&mut self) {
        self.was_connected = false;
        self.grace_deadline = None;
        self.has_been_healthy = false;
        self.consecutive_unhealthy = 0;
    }

    pub(crate) fn on_connect_failed(&mut self) -> Triple {
        self.reset();
        Triple::CONNECT_FAILED
    }

    /// Judges one iteration in which the worker is connected.
    pub(crate) fn on_connected(&mut self, now: Instant, healthy: bool) -> Verdict {
        if !self.was_connected {
            self.was_connected = true;
            self.grace_deadline = Some(now + self.grace);
        }

        if healthy {
            self.has_been_healthy = true;
            self.consecutive_unhealthy = 0;
            let start_control_loop = !self.control_loop_started;
            self.control_loop_started = true;
            return Verdict::Publish {
                triple: Triple::RUNNING,
                start_control_loop,
            };
        }

        let in_grace = self.grace_deadline.is_some_and(|d| now < d);
        if in_grace || !self.has_been_healthy {
            return Verdict::Publish {
                triple: Triple::RUNNING,
                start_control_loop: false,
            };
        }

        self.consecutive_unhealthy += 1;
        if self.consecutive_unhealthy >= self.restart_threshold {
            Verdict::Restart
        } else {
            Verdict::Publish {
                triple: Triple::HEARTBEAT_TIMEOUT,
                start_control_loop: false,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn consecutive_unhealthy(&self) -> u32 {
        self.consecutive_unhealthy
    }
}
