//! # Worker-side service.
//!
//! Accepts one controller at a time and answers every [`SensorFrame`] with an
//! [`AlgoResult`]. Pings never reach this loop; the [`Server`] answers them
//! in its receive task.
//!
//! ```text
//!  loop:
//!    accept(≤ accept_timeout) ──► while connected:
//!                                   frame ← try_receive(≤ poll_timeout)
//!                                   sleep(compute_delay + fault delay)
//!                                   send AlgoResult{out = 0.6a + 0.3b + 0.1c}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::clock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::transport::Server;
use crate::wire::{AlgoResult, SensorFrame};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Simulated compute time per frame.
    pub compute_delay: Duration,
    pub accept_timeout: Duration,
    /// Wait per receive attempt; bounds shutdown latency.
    pub poll_timeout: Duration,
    pub send_timeout: Duration,
    pub faults: FaultConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            compute_delay: Duration::from_millis(10),
            accept_timeout: Duration::from_secs(1),
            poll_timeout: Duration::from_millis(50),
            send_timeout: Duration::from_millis(50),
            faults: FaultConfig::default(),
        }
    }
}

/// Why [`WorkerService::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    /// `crash_after_frames` fired; the caller should die abruptly.
    CrashRequested,
}

/// The worker's algorithm.
pub fn compute(frame: &SensorFrame) -> f64 {
    0.6 * frame.a + 0.3 * frame.b + 0.1 * frame.c
}

pub struct WorkerService {
    server: Server,
    cfg: WorkerConfig,
    faults: FaultInjector,
    processed: AtomicU64,
}

impl WorkerService {
    pub fn new(server: Server, cfg: WorkerConfig) -> Self {
        Self {
            server,
            faults: FaultInjector::new(cfg.faults),
            cfg,
            processed: AtomicU64::new(0),
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Frames answered so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub async fn run(&self, token: CancellationToken) -> WorkerExit {
        let exit = self.serve(&token).await;
        self.server.disconnect().await;
        exit
    }

    async fn serve(&self, token: &CancellationToken) -> WorkerExit {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => return WorkerExit::Cancelled,
                ok = self.server.accept(self.cfg.accept_timeout) => ok,
            };
            if !accepted {
                continue;
            }

            while self.server.is_connected() {
                let frame = tokio::select! {
                    _ = token.cancelled() => return WorkerExit::Cancelled,
                    f = self.server.try_receive_sensor_frame(self.cfg.poll_timeout) => f,
                };
                let Some(frame) = frame else {
                    continue;
                };

                let result = self.process(&frame).await;
                let _ = self.server.send(result, self.cfg.send_timeout).await;
                self.processed.fetch_add(1, Ordering::Relaxed);
                if self.faults.frame_served() {
                    return WorkerExit::CrashRequested;
                }
            }
        }
    }

    async fn process(&self, frame: &SensorFrame) -> AlgoResult {
        let started = Instant::now();
        let delay = self.cfg.compute_delay + self.faults.extra_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        AlgoResult {
            sensor_seq: frame.seq,
            produced_ts_ns: clock::now_ns(),
            out_value: compute(frame),
            latency_ms: clock::duration_ms(started.elapsed()),
        }
    }
}
