//! In-process fakes behind the crate's trait seams.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::lifecycle::{Launch, WorkerProcess};
use crate::transport::{Server, WorkerLink};
use crate::wire::{AlgoResult, Message, Pong};
use crate::worker::{WorkerConfig, WorkerExit, WorkerService};

/// How a [`ScriptedLink`] answers pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PongMode {
    Echo,
    Drop,
    /// Answers with the sequence number `n` rounds behind.
    Lag(u64),
}

pub(crate) struct ScriptedLink {
    connected: AtomicBool,
    connect_ok: AtomicBool,
    connects: AtomicU64,
    mode: Mutex<PongMode>,
    sent: Mutex<Vec<Message>>,
    pongs: Mutex<VecDeque<Pong>>,
    results: Mutex<VecDeque<AlgoResult>>,
}

impl ScriptedLink {
    fn with_state(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            connect_ok: AtomicBool::new(true),
            connects: AtomicU64::new(0),
            mode: Mutex::new(PongMode::Echo),
            sent: Mutex::new(Vec::new()),
            pongs: Mutex::new(VecDeque::new()),
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn connected() -> Self {
        Self::with_state(true)
    }

    pub(crate) fn disconnected() -> Self {
        Self::with_state(false)
    }

    pub(crate) fn set_mode(&self, mode: PongMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub(crate) fn set_connect_ok(&self, ok: bool) {
        self.connect_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn push_result(&self, r: AlgoResult) {
        self.results.lock().unwrap().push_back(r);
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLink for ScriptedLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, _addr: SocketAddr, _timeout: Duration) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let ok = self.connect_ok.load(Ordering::SeqCst);
        self.connected.store(ok, Ordering::SeqCst);
        ok
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pongs.lock().unwrap().clear();
        self.results.lock().unwrap().clear();
    }

    async fn send(&self, msg: Message, _timeout: Duration) -> bool {
        if !self.is_connected() {
            return false;
        }
        if let Message::Ping(ping) = msg {
            let mode = *self.mode.lock().unwrap();
            let echoed = match mode {
                PongMode::Echo => Some(ping.seq),
                PongMode::Drop => None,
                PongMode::Lag(n) => ping.seq.checked_sub(n),
            };
            if let Some(seq) = echoed {
                self.pongs.lock().unwrap().push_back(Pong {
                    seq,
                    t0_ns: ping.t0_ns,
                    t1_ns: ping.t0_ns,
                });
            }
        }
        self.sent.lock().unwrap().push(msg);
        true
    }

    async fn try_receive_pong(&self, timeout: Duration) -> Option<Pong> {
        let queued = self.pongs.lock().unwrap().pop_front();
        if queued.is_none() {
            tokio::time::sleep(timeout).await;
        }
        queued
    }

    async fn try_receive_algo_result(&self, timeout: Duration) -> Option<AlgoResult> {
        let queued = self.results.lock().unwrap().pop_front();
        if queued.is_none() {
            tokio::time::sleep(timeout).await;
        }
        queued
    }
}

#[derive(Default)]
struct LaunchCounters {
    spawns: AtomicU64,
    terminations: AtomicU64,
    fail_spawn: AtomicBool,
    fail_ready: AtomicBool,
}

/// Launcher that either starts an in-process [`WorkerService`] on a fixed
/// loopback port or only pretends to start something.
pub(crate) struct FakeLauncher {
    addr: SocketAddr,
    in_process: bool,
    counters: Arc<LaunchCounters>,
}

impl FakeLauncher {
    pub(crate) fn scripted() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 9)),
            in_process: false,
            counters: Arc::default(),
        }
    }

    pub(crate) async fn in_process() -> Self {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        Self {
            addr,
            in_process: true,
            counters: Arc::default(),
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn spawns(&self) -> u64 {
        self.counters.spawns.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> u64 {
        self.counters.terminations.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_spawn(&self, fail: bool) {
        self.counters.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_ready(&self, fail: bool) {
        self.counters.fail_ready.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Launch for FakeLauncher {
    async fn spawn(&self) -> Result<Box<dyn WorkerProcess>, LifecycleError> {
        if self.counters.fail_spawn.load(Ordering::SeqCst) {
            return Err(LifecycleError::Launch {
                program: self.describe(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            });
        }
        self.counters.spawns.fetch_add(1, Ordering::SeqCst);

        let service = if self.in_process {
            let server = Server::bind(self.addr).await.unwrap();
            let svc = Arc::new(WorkerService::new(
                server,
                WorkerConfig {
                    compute_delay: Duration::from_millis(1),
                    accept_timeout: Duration::from_millis(100),
                    ..WorkerConfig::default()
                },
            ));
            let token = CancellationToken::new();
            let run = {
                let token = token.clone();
                tokio::spawn(async move { svc.run(token).await })
            };
            Some((token, run))
        } else {
            None
        };

        Ok(Box::new(FakeProcess {
            counters: Arc::clone(&self.counters),
            service,
            alive: true,
        }))
    }

    fn describe(&self) -> String {
        "fake-worker".to_string()
    }
}

struct FakeProcess {
    counters: Arc<LaunchCounters>,
    service: Option<(CancellationToken, JoinHandle<WorkerExit>)>,
    alive: bool,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        self.alive.then_some(4242)
    }

    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), LifecycleError> {
        if self.counters.fail_ready.load(Ordering::SeqCst) {
            return Err(LifecycleError::HandshakeTimeout { timeout });
        }
        Ok(())
    }

    fn exit_status(&mut self) -> Option<String> {
        (!self.alive).then(|| "terminated".to_string())
    }

    async fn terminate(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.counters.terminations.fetch_add(1, Ordering::SeqCst);
        if let Some((token, run)) = self.service.take() {
            token.cancel();
            let _ = run.await;
        }
    }
}
