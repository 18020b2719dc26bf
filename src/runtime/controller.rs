//! # Controller runtime.
//!
//! Sequences the lifecycle manager, heartbeat monitor and control loop, and
//! publishes the externally visible status triple.
//!
//! ```text
//!  start():  status=Starting ─► sensor.start ─► heartbeat.start ─► spawn supervisor loop
//!
//!  supervisor loop (every tick):
//!    latched? ──yes──► publish RestartLimitExceeded, no lifecycle calls
//!      │no
//!    ensure_connected ──err──► reset, publish Degraded/Disconnected, sleep reconnect_delay
//!      │ok (link was down before? ─► fresh grace window)
//!    Supervision::on_connected(now, heartbeat.healthy())
//!      ├─ Publish{triple, start_control_loop} ─► control.start() once, publish
//!      └─ Restart ─► publish HeartbeatTimeout ─► lifecycle.restart()
//!                      ├─ RestartLimitExceeded ─► latch
//!                      └─ otherwise ─► reset, sleep settle_delay
//!
//!  stop():   Stopping ─► supervisor loop ─► control loop ─► heartbeat
//!            ─► sensor ─► transport ─► child process ─► Stopped
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisionConfig;
use crate::control::ControlLoop;
use crate::events::{Bus, Event, EventKind};
use crate::heartbeat::HeartbeatMonitor;
use crate::lifecycle::Lifecycle;
use crate::sensor::SensorPipeline;
use crate::status::{StatusSink, SystemState, SystemStatus};
use crate::subscribers::SubscriberSet;
use crate::transport::WorkerLink;

use super::supervision::{Supervision, Triple, Verdict};

pub(super) struct Parts {
    pub(super) cfg: SupervisionConfig,
    pub(super) bus: Bus,
    pub(super) link: Arc<dyn WorkerLink>,
    pub(super) lifecycle: Arc<dyn Lifecycle>,
    pub(super) heartbeat: HeartbeatMonitor,
    pub(super) control: ControlLoop,
    pub(super) sensor: Option<Arc<SensorPipeline>>,
    pub(super) status: Arc<dyn StatusSink>,
}

struct Inner {
    parts: Parts,
    last_triple: Mutex<Option<Triple>>,
}

struct Listener {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Top-level controller: owns the supervisor loop and all its collaborators.
pub struct ControllerRuntime {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    listener: Mutex<Option<Listener>>,
    stopped: Mutex<bool>,
}

impl ControllerRuntime {
    pub(super) fn new(parts: Parts, subs: SubscriberSet) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(subscriber_listener(
            parts.bus.subscribe(),
            subs,
            token.clone(),
        ));
        Self {
            inner: Arc::new(Inner {
                parts,
                last_triple: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
            listener: Mutex::new(Some(Listener { token, task })),
            stopped: Mutex::new(false),
        }
    }

    /// Starts the sensor, the heartbeat and the supervisor loop.
    ///
    /// A second call, or a call after [`stop`](Self::stop), is a no-op.
    pub fn start(&self) {
        if *lock(&self.stopped) {
            return;
        }
        let mut supervisor = lock(&self.supervisor);
        if supervisor.is_some() {
            return;
        }

        let p = &self.inner.parts;
        p.status.modify(&mut |s| {
            s.system_state = SystemState::Starting;
        });
        if let Some(sensor) = &p.sensor {
            sensor.start();
        }
        p.heartbeat.start();

        let token = CancellationToken::new();
        let task = tokio::spawn(supervise(Arc::clone(&self.inner), token.clone()));
        *supervisor = Some((token, task));
    }

    /// Shuts everything down in order and waits for it. Idempotent.
    pub async fn stop(&self) {
        {
            let mut stopped = lock(&self.stopped);
            if *stopped {
                return;
            }
            *stopped = true;
        }
        let p = &self.inner.parts;
        p.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.inner.set_state(SystemState::Stopping);

        let taken = lock(&self.supervisor).take();
        if let Some((token, task)) = taken {
            token.cancel();
            let _ = task.await;
        }
        p.control.stop().await;
        p.heartbeat.stop().await;
        if let Some(sensor) = &p.sensor {
            sensor.stop().await;
        }
        p.link.disconnect().await;
        p.lifecycle.shutdown().await;

        self.inner.set_state(SystemState::Stopped);

        let listener = lock(&self.listener).take();
        if let Some(l) = listener {
            l.token.cancel();
            let _ = l.task.await;
        }
    }

    /// Copy of the current status snapshot.
    pub fn status(&self) -> SystemStatus {
        self.inner.parts.status.read()
    }

    /// Bus the runtime and its components publish on.
    pub fn bus(&self) -> &Bus {
        &self.inner.parts.bus
    }

    pub fn restart_count(&self) -> u64 {
        self.inner.parts.lifecycle.restart_count()
    }

    pub fn is_control_loop_running(&self) -> bool {
        self.inner.parts.control.is_running()
    }
}

impl Inner {
    /// Writes the triple and the supervisor-owned metrics; announces changes.
    fn publish(&self, triple: Triple, message: &str) {
        let hb = self.parts.heartbeat.state();
        let restarts = self.parts.lifecycle.restart_count();
        self.parts.status.modify(&mut |s| {
            s.system_state = triple.state;
            s.algo_health = triple.health;
            s.last_error = triple.error;
            s.last_error_message = message.to_string();
            s.heartbeat_rtt_ms = hb.last_rtt_ms;
            s.heartbeat_timeouts = hb.timeout_count;
            s.algo_restarts = restarts;
        });

        let changed = {
            let mut last = lock(&self.last_triple);
            let changed = *last != Some(triple);
            *last = Some(triple);
            changed
        };
        if changed {
            let mut ev =
                Event::new(EventKind::StateChanged).with_status(triple.state, triple.health, triple.error);
            if !message.is_empty() {
                ev = ev.with_reason(message.to_string());
            }
            self.parts.bus.publish(ev);
        }
    }

    /// Changes only the state, keeping health and error.
    fn set_state(&self, state: SystemState) {
        let mut current = self.parts.status.read();
        current.system_state = state;
        let triple = Triple::new(state, current.algo_health, current.last_error);
        self.publish(triple, &current.last_error_message);
    }
}

async fn supervise(inner: Arc<Inner>, token: CancellationToken) {
    let p = &inner.parts;
    let mut sup = Supervision::new(p.cfg.connection_grace, p.cfg.unhealthy_restart_threshold);
    let mut latched = false;

    loop {
        let pause = tokio::select! {
            _ = token.cancelled() => return,
            pause = iterate(&inner, &mut sup, &mut latched) => pause,
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// One supervisor iteration; returns how long to pause before the next.
async fn iterate(inner: &Inner, sup: &mut Supervision, latched: &mut bool) -> std::time::Duration {
    let p = &inner.parts;
    if *latched {
        inner.publish(Triple::RESTART_LIMIT, "restart limit exceeded");
        return p.cfg.tick;
    }

    let was_up = p.link.is_connected();
    if let Err(e) = p.lifecycle.ensure_connected().await {
        if e.is_terminal() {
            *latched = true;
            inner.publish(Triple::RESTART_LIMIT, &e.to_string());
            return p.cfg.tick;
        }
        inner.publish(sup.on_connect_failed(), &e.to_string());
        return p.cfg.reconnect_delay;
    }
    if !was_up {
        sup.on_reconnected();
    }

    match sup.on_connected(Instant::now(), p.heartbeat.healthy()) {
        Verdict::Publish {
            triple,
            start_control_loop,
        } => {
            if start_control_loop {
                p.control.start();
            }
            inner.publish(triple, "");
            p.cfg.tick
        }
        Verdict::Restart => {
            inner.publish(Triple::HEARTBEAT_TIMEOUT, "heartbeat lost, restarting worker");
            match p.lifecycle.restart().await {
                Err(e) if e.is_terminal() => {
                    *latched = true;
                    inner.publish(Triple::RESTART_LIMIT, &e.to_string());
                    p.cfg.tick
                }
                _ => {
                    sup.reset();
                    p.cfg.settle_delay
                }
            }
        }
    }
}

/// Forwards bus events to subscribers until cancelled, then drains what is
/// already queued and closes the set.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            ev = rx.recv() => match ev {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = token.cancelled() => {
                while let Ok(ev) = rx.try_recv() {
                    set.emit(&ev);
                }
                break;
            }
        }
    }
    set.shutdown().await;
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::error::LifecycleError;
    use crate::lifecycle::{LifecycleConfig, ProcessManager};
    use crate::policies::{BackoffPolicy, RestartPolicy};
    use crate::runtime::RuntimeBuilder;
    use crate::status::{AlgoHealth, ErrorCode};
    use crate::testkit::{FakeLauncher, PongMode, ScriptedLink};

    fn fast_config(max_restarts: u64) -> Config {
        let mut cfg = Config::default();
        cfg.connect_timeout = Duration::from_millis(20);
        cfg.ready_timeout = Duration::from_millis(50);
        cfg.restart = RestartPolicy {
            max_restarts,
            backoff: BackoffPolicy::constant(Duration::from_millis(5)),
        };
        cfg.heartbeat.interval = Duration::from_millis(20);
        cfg.heartbeat.timeout = Duration::from_millis(10);
        cfg.heartbeat.miss_threshold = 1;
        cfg.supervision.tick = Duration::from_millis(10);
        cfg.supervision.reconnect_delay = Duration::from_millis(10);
        cfg.supervision.settle_delay = Duration::from_millis(10);
        cfg.supervision.connection_grace = Duration::from_millis(30);
        cfg.supervision.unhealthy_restart_threshold = 2;
        cfg.sensor_rate_hz = 500.0;
        cfg
    }

    fn manager(
        cfg: &Config,
        link: &Arc<ScriptedLink>,
        launcher: &Arc<FakeLauncher>,
        bus: &Bus,
    ) -> Arc<ProcessManager> {
        let lc = LifecycleConfig {
            worker_addr: launcher.addr(),
            ..cfg.lifecycle()
        };
        Arc::new(ProcessManager::new(
            lc,
            link.clone(),
            launcher.clone(),
            bus.clone(),
        ))
    }

    fn state_changes(rx: &mut broadcast::Receiver<Event>) -> Vec<Triple> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StateChanged {
                out.push(Triple::new(
                    ev.state.unwrap(),
                    ev.health.unwrap(),
                    ev.error.unwrap(),
                ));
            }
        }
        out
    }

    #[tokio::test]
    async fn unreachable_worker_stays_degraded_without_restarts() {
        let cfg = fast_config(5);
        let link = Arc::new(ScriptedLink::disconnected());
        link.set_connect_ok(false);
        let launcher = Arc::new(FakeLauncher::scripted());
        launcher.fail_spawn(true);
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle.clone())
            .build();
        rt.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let s = rt.status();
        assert_eq!(s.system_state, SystemState::Degraded);
        assert_eq!(s.algo_health, AlgoHealth::Disconnected);
        assert_eq!(s.last_error, ErrorCode::IpcConnectFailed);
        assert_eq!(rt.restart_count(), 0);
        assert_eq!(launcher.spawns(), 0);
        assert!(!rt.is_control_loop_running());

        rt.stop().await;
        assert_eq!(rt.status().system_state, SystemState::Stopped);
    }

    #[tokio::test]
    async fn healthy_worker_starts_control_loop_once() {
        let cfg = fast_config(5);
        let link = Arc::new(ScriptedLink::connected());
        let launcher = Arc::new(FakeLauncher::scripted());
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle)
            .build();
        let mut rx = rt.bus().subscribe();
        assert_eq!(rt.status().system_state, SystemState::Starting);

        rt.start();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let started = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::ControlLoopStarted)
            .count();
        assert_eq!(started, 1);
        assert!(rt.is_control_loop_running());
        let s = rt.status();
        assert_eq!(s.system_state, SystemState::Running);
        assert_eq!(s.algo_health, AlgoHealth::Healthy);
        assert!(s.sensor_seq > 0);
        assert_eq!(launcher.spawns(), 0);

        rt.stop().await;
        assert!(!rt.is_control_loop_running());
    }

    #[tokio::test]
    async fn lost_heartbeat_restarts_worker_once() {
        let cfg = fast_config(5);
        let link = Arc::new(ScriptedLink::connected());
        let launcher = Arc::new(FakeLauncher::scripted());
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle)
            .build();
        let mut rx = rt.bus().subscribe();
        rt.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rt.status().algo_health, AlgoHealth::Healthy);

        link.set_mode(PongMode::Drop);
        tokio::time::sleep(Duration::from_millis(400)).await;

        // After the restart the fresh worker has not proven health yet,
        // so it is not restarted again.
        assert_eq!(rt.restart_count(), 1);
        assert_eq!(launcher.spawns(), 1);
        let seen = state_changes(&mut rx);
        assert!(seen.contains(&Triple::HEARTBEAT_TIMEOUT));
        assert_eq!(rt.status().system_state, SystemState::Running);

        rt.stop().await;
    }

    #[tokio::test]
    async fn reconnect_after_link_loss_gets_fresh_grace() {
        let mut cfg = fast_config(5);
        cfg.supervision.connection_grace = Duration::from_millis(500);
        let link = Arc::new(ScriptedLink::connected());
        let launcher = Arc::new(FakeLauncher::scripted());
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle)
            .build();
        let mut rx = rt.bus().subscribe();
        rt.start();
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(rt.status().algo_health, AlgoHealth::Healthy);

        // Worker drops the link and is briefly silent after reconnecting.
        link.set_mode(PongMode::Drop);
        link.drop_connection();
        tokio::time::sleep(Duration::from_millis(150)).await;
        link.set_mode(PongMode::Echo);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(rt.restart_count(), 0);
        assert_eq!(link.connects(), 1, "reconnected once, no restart");
        assert_eq!(launcher.spawns(), 0);
        assert!(!state_changes(&mut rx).contains(&Triple::HEARTBEAT_TIMEOUT));
        let s = rt.status();
        assert_eq!(s.system_state, SystemState::Running);
        assert_eq!(s.algo_health, AlgoHealth::Healthy);
        assert!(rt.is_control_loop_running());

        rt.stop().await;
    }

    #[tokio::test]
    async fn restart_limit_latches_degraded() {
        let cfg = fast_config(0);
        let link = Arc::new(ScriptedLink::connected());
        let launcher = Arc::new(FakeLauncher::scripted());
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle)
            .build();
        rt.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        link.set_mode(PongMode::Drop);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Recovering pongs do not lift the latch.
        link.set_mode(PongMode::Echo);
        let connects = link.connects();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let s = rt.status();
        assert_eq!(s.system_state, SystemState::Degraded);
        assert_eq!(s.last_error, ErrorCode::RestartLimitExceeded);
        assert_eq!(launcher.spawns(), 0);
        assert_eq!(link.connects(), connects, "no lifecycle calls after latching");
        assert!(
            LifecycleError::RestartLimitExceeded { max: 0 }.is_terminal(),
            "latch is driven by the terminal error"
        );

        rt.stop().await;
    }

    #[tokio::test]
    async fn stop_is_ordered_and_idempotent() {
        let cfg = fast_config(5);
        let link = Arc::new(ScriptedLink::connected());
        let launcher = Arc::new(FakeLauncher::scripted());
        let lifecycle = manager(&cfg, &link, &launcher, &Bus::new(64));

        let rt = RuntimeBuilder::new(cfg)
            .with_link(link.clone())
            .with_lifecycle(lifecycle)
            .build();
        let mut rx = rt.bus().subscribe();
        rt.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        rt.stop().await;
        rt.stop().await;
        assert!(!link.is_connected());

        let events: Vec<Event> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let pos = |pred: &dyn Fn(&Event) -> bool| events.iter().position(|e| pred(e)).unwrap();
        let requested = pos(&|e| e.kind == EventKind::ShutdownRequested);
        let stopping = pos(&|e| e.state == Some(SystemState::Stopping));
        let loop_stopped = pos(&|e| e.kind == EventKind::ControlLoopStopped);
        let stopped = pos(&|e| e.state == Some(SystemState::Stopped));
        assert!(requested < stopping);
        assert!(stopping < loop_stopped);
        assert!(loop_stopped < stopped);
        assert_eq!(
            events
                .iter()
                .filter(|e| e.kind == EventKind::ShutdownRequested)
                .count(),
            1
        );
        assert_eq!(rt.status().system_state, SystemState::Stopped);

        // Start after stop does nothing.
        rt.start();
        assert!(!rt.is_control_loop_running());
    }
}
