//! # Heartbeat health monitor.
//!
//! Pings the worker on its own schedule, independent of the control loop,
//! and turns pong arrivals into a debounced `healthy` flag.
//!
//! ## Architecture
//! ```text
//!  every interval:
//!    connected? ──no──► mark unhealthy
//!        │yes
//!        ▼
//!    send Ping{seq, t0} ──► wait ≤ timeout for Pong
//!                              │
//!         ┌────────────────────┼──────────────────────────┐
//!         ▼                    ▼                          ▼
//!   echo == seq          seq-K ≤ echo < seq         nothing acceptable
//!   accept + RTT         accept (liveness only)     miss: misses += 1, timeouts += 1
//!                                                   misses ≥ threshold → unhealthy
//! ```
//!
//! ## Rules
//! - Any accepted pong resets misses and sets `healthy`.
//! - Only an exact match updates the round-trip time.
//! - Pongs newer than the ping just sent, or older than `K` rounds, are
//!   discarded and the wait continues.
//! - The monitor starts unhealthy: health has to be proven by a pong.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock;
use crate::events::{Bus, Event, EventKind};
use crate::transport::WorkerLink;
use crate::wire::Ping;

/// Heartbeat timing and tolerance.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Time between ping rounds.
    pub interval: Duration,
    /// How long a round waits for an acceptable pong.
    pub timeout: Duration,
    /// Consecutive misses before `healthy` turns false.
    pub miss_threshold: u32,
    /// How many rounds late a pong may be and still count as alive (`K`).
    pub pong_tolerance: u64,
    /// Send timeout for a ping.
    pub send_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_millis(500),
            miss_threshold: 3,
            pong_tolerance: 2,
            send_timeout: Duration::from_millis(50),
        }
    }
}

/// Snapshot of the monitor's view of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HealthState {
    pub healthy: bool,
    pub last_rtt_ms: f64,
    /// Lifetime count of missed rounds.
    pub timeout_count: u64,
    pub consecutive_misses: u32,
    /// Sequence number of the last ping sent.
    pub last_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PongMatch {
    Exact,
    Late(u64),
    Reject,
}

pub(crate) fn classify(sent: u64, echoed: u64, tolerance: u64) -> PongMatch {
    if echoed > sent {
        return PongMatch::Reject;
    }
    match sent - echoed {
        0 => PongMatch::Exact,
        lag if lag <= tolerance => PongMatch::Late(lag),
        _ => PongMatch::Reject,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    None,
    Lost,
    Restored,
}

/// Miss-counting hysteresis, free of I/O.
#[derive(Debug)]
pub(crate) struct Tracker {
    threshold: u32,
    state: HealthState,
}

impl Tracker {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            state: HealthState::default(),
        }
    }

    pub(crate) fn state(&self) -> HealthState {
        self.state
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.state.last_seq += 1;
        self.state.last_seq
    }

    pub(crate) fn on_accept(&mut self, rtt_ms: Option<f64>) -> Transition {
        let was = self.state.healthy;
        self.state.healthy = true;
        self.state.consecutive_misses = 0;
        if let Some(rtt) = rtt_ms {
            self.state.last_rtt_ms = rtt;
        }
        if was { Transition::None } else { Transition::Restored }
    }

    pub(crate) fn on_miss(&mut self) -> Transition {
        self.state.consecutive_misses = self.state.consecutive_misses.saturating_add(1);
        self.state.timeout_count += 1;
        if self.state.healthy && self.state.consecutive_misses >= self.threshold {
            self.state.healthy = false;
            return Transition::Lost;
        }
        Transition::None
    }

    pub(crate) fn on_disconnected(&mut self) -> Transition {
        let was = self.state.healthy;
        self.state.healthy = false;
        if was { Transition::Lost } else { Transition::None }
    }
}

fn lock(m: &Mutex<Tracker>) -> MutexGuard<'_, Tracker> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Periodic ping/pong liveness check against a [`WorkerLink`].
pub struct HeartbeatMonitor {
    cfg: HeartbeatConfig,
    link: Arc<dyn WorkerLink>,
    bus: Bus,
    tracker: Arc<Mutex<Tracker>>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HeartbeatMonitor {
    pub fn new(cfg: HeartbeatConfig, link: Arc<dyn WorkerLink>, bus: Bus) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(Tracker::new(cfg.miss_threshold))),
            cfg,
            link,
            bus,
            running: Mutex::new(None),
        }
    }

    /// Spawns the ticker; a second call is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let round = Round {
            cfg: self.cfg,
            link: Arc::clone(&self.link),
            bus: self.bus.clone(),
            tracker: Arc::clone(&self.tracker),
        };
        let task = tokio::spawn(round.run(token.clone()));
        *running = Some((token, task));
    }

    /// Cancels and joins the ticker; safe if never started.
    pub async fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some((token, task)) = taken {
            token.cancel();
            let _ = task.await;
        }
    }

    pub fn healthy(&self) -> bool {
        lock(&self.tracker).state().healthy
    }

    pub fn state(&self) -> HealthState {
        lock(&self.tracker).state()
    }
}

struct Round {
    cfg: HeartbeatConfig,
    link: Arc<dyn WorkerLink>,
    bus: Bus,
    tracker: Arc<Mutex<Tracker>>,
}

impl Round {
    async fn run(self, token: CancellationToken) {
        loop {
            let started = Instant::now();
            let round = tokio::select! {
                _ = token.cancelled() => return,
                r = self.once() => r,
            };
            self.report(round);

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep_until(started + self.cfg.interval) => {}
            }
        }
    }

    /// One ping round.
    async fn once(&self) -> RoundResult {
        if !self.link.is_connected() {
            let mut t = lock(&self.tracker);
            return RoundResult {
                seq: t.state().last_seq,
                missed: false,
                transition: t.on_disconnected(),
            };
        }

        let seq = lock(&self.tracker).next_seq();
        let t0 = clock::now_ns();
        let sent = self
            .link
            .send(Ping { seq, t0_ns: t0 }.into(), self.cfg.send_timeout)
            .await;

        let deadline = Instant::now() + self.cfg.timeout;
        while sent {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(pong) = self.link.try_receive_pong(remaining).await else {
                break;
            };
            let rtt = match classify(seq, pong.seq, self.cfg.pong_tolerance) {
                PongMatch::Exact => Some(clock::ns_to_ms(clock::now_ns().saturating_sub(t0))),
                PongMatch::Late(lag) => {
                    self.bus.publish(
                        Event::new(EventKind::PongLate)
                            .with_heartbeat_seq(pong.seq)
                            .with_reason(format!("lag={lag}")),
                    );
                    None
                }
                PongMatch::Reject => continue,
            };
            return RoundResult {
                seq,
                missed: false,
                transition: lock(&self.tracker).on_accept(rtt),
            };
        }

        RoundResult {
            seq,
            missed: true,
            transition: lock(&self.tracker).on_miss(),
        }
    }

    fn report(&self, round: RoundResult) {
        let misses = lock(&self.tracker).state().consecutive_misses;
        if round.missed {
            self.bus.publish(
                Event::new(EventKind::HeartbeatMissed)
                    .with_heartbeat_seq(round.seq)
                    .with_misses(misses),
            );
        }
        match round.transition {
            Transition::Lost => self
                .bus
                .publish(Event::new(EventKind::HealthLost).with_misses(misses)),
            Transition::Restored => self
                .bus
                .publish(Event::new(EventKind::HealthRestored).with_heartbeat_seq(round.seq)),
            Transition::None => {}
        }
    }
}

struct RoundResult {
    seq: u64,
    missed: bool,
    transition: Transition,
}
