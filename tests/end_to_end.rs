//! Controller runtime against the real `algo_worker` binary over loopback.

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use algovisor::{
    AlgoHealth, Config, ControllerRuntime, Event, EventKind, ReadinessSignal, RuntimeBuilder,
    Subscribe, SystemState, WorkerCommand,
};
use async_trait::async_trait;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn states(&self) -> Vec<(SystemState, AlgoHealth)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::StateChanged)
            .map(|e| (e.state.unwrap(), e.health.unwrap()))
            .collect()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.events.lock().unwrap().push(ev.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

fn free_addr() -> SocketAddr {
    let probe = TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

fn config(addr: SocketAddr, readiness: ReadinessSignal, extra: &[&str]) -> Config {
    let mut args = vec![
        "--host".to_string(),
        addr.ip().to_string(),
        "--port".to_string(),
        addr.port().to_string(),
        "--log-level".to_string(),
        "warn".to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));

    let mut cfg = Config::default();
    cfg.worker_addr = addr;
    cfg.worker = WorkerCommand {
        program: env!("CARGO_BIN_EXE_algo_worker").into(),
        args,
        readiness,
        ..WorkerCommand::default()
    };
    cfg.restart.backoff = algovisor::BackoffPolicy::constant(Duration::from_millis(50));
    cfg
}

fn build(cfg: Config) -> (ControllerRuntime, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let rt = RuntimeBuilder::new(cfg)
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();
    (rt, recorder)
}

async fn wait_for_state(rt: &ControllerRuntime, state: SystemState, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if rt.status().system_state == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn healthy_worker_runs_without_degrading() {
    let addr = free_addr();
    let (rt, recorder) = build(config(addr, ReadinessSignal::PipeByte, &[]));
    assert_eq!(rt.status().system_state, SystemState::Starting);

    rt.start();
    assert!(wait_for_state(&rt, SystemState::Running, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let s = rt.status();
    assert_eq!(s.system_state, SystemState::Running);
    assert_eq!(s.algo_health, AlgoHealth::Healthy);
    assert_eq!(s.heartbeat_timeouts, 0);
    assert_eq!(s.algo_restarts, 0);
    assert!(s.sensor_seq > 100, "sensor_seq = {}", s.sensor_seq);
    assert!(s.heartbeat_rtt_ms > 0.0);
    assert!(s.algo_latency_ms > 0.0);

    rt.stop().await;

    let states = recorder.states();
    assert_eq!(states.first(), Some(&(SystemState::Running, AlgoHealth::Healthy)));
    assert!(
        states.iter().all(|(st, _)| *st != SystemState::Degraded),
        "unexpected Degraded in {states:?}"
    );
    assert_eq!(states.last().map(|s| s.0), Some(SystemState::Stopped));
    assert_eq!(recorder.count(EventKind::WorkerLaunching), 1);
    assert_eq!(recorder.count(EventKind::ControlLoopStarted), 1);
    assert_eq!(recorder.count(EventKind::WorkerTerminated), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crashing_worker_is_relaunched() {
    let addr = free_addr();
    let name = format!("algovisor-e2e-{}", addr.port());
    let (rt, recorder) = build(config(
        addr,
        ReadinessSignal::NamedEvent { name },
        &["--crash-after-frames", "200"],
    ));

    rt.start();
    assert!(wait_for_state(&rt, SystemState::Running, Duration::from_secs(5)).await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while recorder.count(EventKind::WorkerLaunching) < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(recorder.count(EventKind::WorkerLaunching) >= 2);
    assert!(wait_for_state(&rt, SystemState::Running, Duration::from_secs(5)).await);

    rt.stop().await;
    assert_eq!(rt.status().system_state, SystemState::Stopped);
}
