//! # Process lifecycle manager.
//!
//! ```text
//!              ensure_connected / restart
//!                         │
//!   NotRunning ──spawn──► Starting ──spawned──► ReadyWait ──signal+connect──► Running
//!       ▲                    │                     │                            │
//!       └────── failure ─────┴──────── failure ────┴────── shutdown/restart ────┘
//! ```
//!
//! ## Rules
//! - `ensure_connected` tries a plain connect first, so a worker started
//!   outside the manager is adopted as-is.
//! - At most one child exists; starting a new one reaps the previous one.
//! - `restart` refuses once the restart budget is spent and never launches
//!   anything in that case.
//! - The restart count only grows when a restart fully succeeds.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::LifecycleError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RestartPolicy;
use crate::transport::WorkerLink;

use super::Lifecycle;
use super::process::{Launch, WorkerProcess};

/// Where the manager's state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    NotRunning,
    Starting,
    ReadyWait,
    Running,
}

/// Timing and budget for the lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub worker_addr: SocketAddr,
    pub connect_timeout: Duration,
    /// Bound on the readiness handshake.
    pub ready_timeout: Duration,
    pub restart: RestartPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            worker_addr: SocketAddr::from(([127, 0, 0, 1], 45678)),
            connect_timeout: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(3),
            restart: RestartPolicy::default(),
        }
    }
}

pub struct ProcessManager {
    cfg: LifecycleConfig,
    link: Arc<dyn WorkerLink>,
    launcher: Arc<dyn Launch>,
    bus: Bus,
    child: Mutex<Option<Box<dyn WorkerProcess>>>,
    state: StdMutex<LifecycleState>,
    restarts: AtomicU64,
    /// Serialises ensure_connected / restart / shutdown.
    op: Mutex<()>,
}

impl ProcessManager {
    pub fn new(
        cfg: LifecycleConfig,
        link: Arc<dyn WorkerLink>,
        launcher: Arc<dyn Launch>,
        bus: Bus,
    ) -> Self {
        Self {
            cfg,
            link,
            launcher,
            bus,
            child: Mutex::new(None),
            state: StdMutex::new(LifecycleState::NotRunning),
            restarts: AtomicU64::new(0),
            op: Mutex::new(()),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, s: LifecycleState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = s;
    }

    async fn connect(&self) -> bool {
        let addr = self.cfg.worker_addr;
        let ok = self.link.connect(addr, self.cfg.connect_timeout).await;
        let kind = if ok {
            EventKind::WorkerConnected
        } else {
            EventKind::WorkerConnectFailed
        };
        self.bus.publish(
            Event::new(kind)
                .with_addr(addr)
                .with_timeout(self.cfg.connect_timeout),
        );
        ok
    }

    /// Reports a child that died on its own and forgets it.
    async fn reap_exited(&self) {
        let mut child = self.child.lock().await;
        let Some(proc) = child.as_mut() else {
            return;
        };
        if let Some(status) = proc.exit_status() {
            self.bus.publish(
                Event::new(EventKind::WorkerExited)
                    .with_pid(proc.pid())
                    .with_reason(status),
            );
            *child = None;
            self.set_state(LifecycleState::NotRunning);
        }
    }

    async fn cleanup_process(&self) {
        let taken = self.child.lock().await.take();
        if let Some(mut proc) = taken {
            let pid = proc.pid();
            proc.terminate().await;
            self.bus
                .publish(Event::new(EventKind::WorkerTerminated).with_pid(pid));
        }
        self.set_state(LifecycleState::NotRunning);
    }

    /// Launches the worker and waits for its readiness signal.
    async fn start_process(&self) -> Result<(), LifecycleError> {
        self.cleanup_process().await;

        self.set_state(LifecycleState::Starting);
        self.bus.publish(
            Event::new(EventKind::WorkerLaunching).with_reason(self.launcher.describe()),
        );
        let mut proc = match self.launcher.spawn().await {
            Ok(p) => p,
            Err(e) => return Err(self.start_failed(e)),
        };

        self.set_state(LifecycleState::ReadyWait);
        if let Err(e) = proc.wait_ready(self.cfg.ready_timeout).await {
            proc.terminate().await;
            return Err(self.start_failed(e));
        }

        self.bus
            .publish(Event::new(EventKind::WorkerReady).with_pid(proc.pid()));
        *self.child.lock().await = Some(proc);
        Ok(())
    }

    fn start_failed(&self, e: LifecycleError) -> LifecycleError {
        self.set_state(LifecycleState::NotRunning);
        let mut ev = Event::new(EventKind::WorkerStartFailed)
            .with_reason(format!("{}: {e}", e.as_label()));
        match &e {
            LifecycleError::HandshakeTimeout { timeout }
            | LifecycleError::ConnectTimeout { timeout, .. } => ev = ev.with_timeout(*timeout),
            _ => {}
        }
        self.bus.publish(ev);
        e
    }

    /// On a connect failure the ready child is kept: the next
    /// `ensure_connected` retries a plain connect before relaunching, and
    /// any relaunch terminates it first.
    async fn start_and_connect(&self) -> Result<(), LifecycleError> {
        self.start_process().await?;
        if self.connect().await {
            self.set_state(LifecycleState::Running);
            Ok(())
        } else {
            Err(self.start_failed(LifecycleError::ConnectTimeout {
                addr: self.cfg.worker_addr,
                timeout: self.cfg.connect_timeout,
            }))
        }
    }
}

#[async_trait]
impl Lifecycle for ProcessManager {
    async fn ensure_connected(&self) -> Result<(), LifecycleError> {
        let _op = self.op.lock().await;
        if self.link.is_connected() {
            return Ok(());
        }

        self.reap_exited().await;
        if self.connect().await {
            self.set_state(LifecycleState::Running);
            return Ok(());
        }
        self.start_and_connect().await
    }

    async fn restart(&self) -> Result<(), LifecycleError> {
        let _op = self.op.lock().await;
        let policy = self.cfg.restart;
        let count = self.restarts.load(Ordering::Acquire);
        if !policy.allows(count) {
            self.bus.publish(
                Event::new(EventKind::RestartLimitReached)
                    .with_attempt(count)
                    .with_reason(format!("max_restarts={}", policy.max_restarts)),
            );
            return Err(LifecycleError::RestartLimitExceeded {
                max: policy.max_restarts,
            });
        }

        self.link.disconnect().await;
        self.cleanup_process().await;

        let delay = policy.delay_for(count);
        self.bus.publish(
            Event::new(EventKind::RestartScheduled)
                .with_attempt(count + 1)
                .with_delay(delay),
        );
        tokio::time::sleep(delay).await;

        match self.start_and_connect().await {
            Ok(()) => {
                let now = self.restarts.fetch_add(1, Ordering::AcqRel) + 1;
                self.bus
                    .publish(Event::new(EventKind::RestartSucceeded).with_attempt(now));
                Ok(())
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::RestartFailed)
                        .with_attempt(count + 1)
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::Acquire)
    }

    async fn shutdown(&self) {
        let _op = self.op.lock().await;
        self.link.disconnect().await;
        self.cleanup_process().await;
    }
}
