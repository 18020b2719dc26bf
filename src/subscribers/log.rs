//! # Logging subscriber.
//!
//! [`LogWriter`] turns runtime events into `tracing` records with
//! structured fields. Where they end up (stderr, file, level filter) is
//! decided by whoever installs the `tracing` subscriber.
//!
//! ```text
//! INFO  worker ready pid=4242
//! WARN  heartbeat missed heartbeat_seq=17 misses=2
//! WARN  state changed state=Degraded health=Unhealthy error=2100 reason=...
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::status::{AlgoHealth, ErrorCode, SystemState};

use super::Subscribe;

/// Emits one `tracing` record per event.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerLaunching => info!(program = reason, "launching worker"),
            EventKind::WorkerReady => info!(pid = ?e.pid, "worker ready"),
            EventKind::WorkerStartFailed => {
                warn!(reason, timeout_ms = ?e.timeout_ms, "worker start failed")
            }
            EventKind::WorkerConnected => info!(addr = ?e.addr, "worker connected"),
            EventKind::WorkerConnectFailed => {
                debug!(addr = ?e.addr, timeout_ms = ?e.timeout_ms, "worker connect failed")
            }
            EventKind::WorkerExited => warn!(pid = ?e.pid, status = reason, "worker exited"),
            EventKind::WorkerTerminated => info!(pid = ?e.pid, "worker terminated"),
            EventKind::RestartScheduled => {
                info!(attempt = ?e.attempt, delay_ms = ?e.delay_ms, "restart scheduled")
            }
            EventKind::RestartSucceeded => info!(restarts = ?e.attempt, "restart succeeded"),
            EventKind::RestartFailed => warn!(attempt = ?e.attempt, reason, "restart failed"),
            EventKind::RestartLimitReached => {
                error!(restarts = ?e.attempt, reason, "restart limit reached")
            }
            EventKind::HeartbeatMissed => {
                warn!(heartbeat_seq = ?e.heartbeat_seq, misses = ?e.misses, "heartbeat missed")
            }
            EventKind::PongLate => {
                debug!(heartbeat_seq = ?e.heartbeat_seq, lag = reason, "late pong accepted")
            }
            EventKind::HealthLost => warn!(misses = ?e.misses, reason, "worker health lost"),
            EventKind::HealthRestored => {
                info!(heartbeat_seq = ?e.heartbeat_seq, "worker health restored")
            }
            EventKind::ControlLoopStarted => info!("control loop started"),
            EventKind::ControlLoopStopped => info!("control loop stopped"),
            EventKind::StateChanged => {
                let state = e.state.map_or("-", SystemState::as_str);
                let health = e.health.map_or("-", AlgoHealth::as_str);
                let code = e.error.map_or(0, ErrorCode::code);
                if e.state == Some(SystemState::Degraded) {
                    warn!(state, health, error = code, reason, "state changed");
                } else {
                    info!(state, health, error = code, reason, "state changed");
                }
            }
            EventKind::ShutdownRequested => info!(reason, "shutdown requested"),
            EventKind::SubscriberOverflow => warn!(reason, "subscriber dropped event"),
            EventKind::SubscriberPanicked => error!(reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handles_every_kind_without_a_subscriber_installed() {
        let kinds = [
            EventKind::WorkerLaunching,
            EventKind::WorkerReady,
            EventKind::WorkerStartFailed,
            EventKind::WorkerConnected,
            EventKind::WorkerConnectFailed,
            EventKind::WorkerExited,
            EventKind::WorkerTerminated,
            EventKind::RestartScheduled,
            EventKind::RestartSucceeded,
            EventKind::RestartFailed,
            EventKind::RestartLimitReached,
            EventKind::HeartbeatMissed,
            EventKind::PongLate,
            EventKind::HealthLost,
            EventKind::HealthRestored,
            EventKind::ControlLoopStarted,
            EventKind::ControlLoopStopped,
            EventKind::StateChanged,
            EventKind::ShutdownRequested,
            EventKind::SubscriberOverflow,
            EventKind::SubscriberPanicked,
        ];
        for kind in kinds {
            LogWriter.on_event(&Event::new(kind)).await;
        }
        LogWriter
            .on_event(&Event::new(EventKind::StateChanged).with_status(
                SystemState::Degraded,
                AlgoHealth::Unhealthy,
                ErrorCode::HeartbeatTimeout,
            ))
            .await;
    }
}
