//! # Sensor-driven control loop.
//!
//! ```text
//!  SensorSource ──latest()──► new seq? ──no──► sleep idle_poll
//!                                │yes
//!                                ├──► send SensorFrame (best effort)
//!                                ├──► drain one AlgoResult (short timeout)
//!                                ├──► CommandSelector: fresh | last-known-good | zero
//!                                ├──► Actuator::apply(command, dt)
//!                                └──► StatusSink::modify(command, actuator, rates)
//! ```
//!
//! ## Rules
//! - A sample is processed at most once.
//! - A disconnected or slow worker never blocks a tick beyond the send and read timeouts.
//! - `start()` is idempotent; `stop()` is safe when never started.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::sensor::SensorSource;
use crate::status::StatusSink;
use crate::transport::WorkerLink;
use crate::wire::SensorFrame;

use super::actuator::Actuator;
use super::command::{Command, CommandSelector};

/// Control loop timing.
#[derive(Debug, Clone, Copy)]
pub struct ControlConfig {
    /// Target tick rate.
    pub rate_hz: f64,
    /// How long a tick waits for a fresh algorithm result.
    pub algo_read_timeout: Duration,
    /// Send timeout for sensor frames.
    pub send_timeout: Duration,
    /// Sleep when the sensor has not produced a new sample.
    pub idle_poll: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: 200.0,
            algo_read_timeout: Duration::from_millis(1),
            send_timeout: Duration::from_millis(5),
            idle_poll: Duration::from_millis(1),
        }
    }
}

impl ControlConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(1.0))
    }
}

struct Inner {
    cfg: ControlConfig,
    sensor: Arc<dyn SensorSource>,
    link: Arc<dyn WorkerLink>,
    actuator: Arc<dyn Actuator>,
    status: Arc<dyn StatusSink>,
    last_command: Mutex<Command>,
}

pub struct ControlLoop {
    inner: Arc<Inner>,
    bus: Bus,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ControlLoop {
    pub fn new(
        cfg: ControlConfig,
        sensor: Arc<dyn SensorSource>,
        link: Arc<dyn WorkerLink>,
        actuator: Arc<dyn Actuator>,
        status: Arc<dyn StatusSink>,
        bus: Bus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                sensor,
                link,
                actuator,
                status,
                last_command: Mutex::new(Command::default()),
            }),
            bus,
            running: Mutex::new(None),
        }
    }

    /// Spawns the loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        let task = tokio::spawn(run(Arc::clone(&self.inner), token.clone()));
        *running = Some((token, task));
        self.bus.publish(Event::new(EventKind::ControlLoopStarted));
        true
    }

    pub async fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some((token, task)) = taken {
            token.cancel();
            let _ = task.await;
            self.bus.publish(Event::new(EventKind::ControlLoopStopped));
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Command applied on the most recent tick.
    pub fn last_command(&self) -> Command {
        *self
            .inner
            .last_command
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

/// Sleeps until `until` unless cancelled first. Returns false on cancellation.
async fn pause(token: &CancellationToken, until: Instant) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep_until(until) => true,
    }
}

async fn run(inner: Arc<Inner>, token: CancellationToken) {
    let cfg = inner.cfg;
    let period = cfg.period();
    let mut selector = CommandSelector::default();
    let mut last_seq = 0u64;
    let mut last_tick: Option<Instant> = None;

    while !token.is_cancelled() {
        let started = Instant::now();
        let sample = inner.sensor.latest();
        if sample.seq == last_seq {
            if !pause(&token, started + cfg.idle_poll).await {
                break;
            }
            continue;
        }
        last_seq = sample.seq;

        let link = &inner.link;
        let fresh = if link.is_connected() {
            let frame = SensorFrame {
                seq: sample.seq,
                ts_ns: sample.ts_ns,
                a: sample.a,
                b: sample.b,
                c: sample.c,
            };
            let _ = link.send(frame.into(), cfg.send_timeout).await;
            link.try_receive_algo_result(cfg.algo_read_timeout).await
        } else {
            None
        };
        let command = selector.select(fresh);

        let dt = last_tick.map_or(period, |prev| started - prev).as_secs_f64();
        last_tick = Some(started);
        inner.actuator.apply(command.value, dt);
        let act = inner.actuator.state();

        inner.status.modify(&mut |s| {
            s.sensor_seq = sample.seq;
            s.sensor_rate_hz = sample.effective_rate_hz;
            s.sensor_missed_deadlines = sample.missed_deadlines;
            if dt > 0.0 {
                s.control_loop_hz = 1.0 / dt;
            }
            s.last_command = command.value;
            s.actuator_position = act.position;
            s.actuator_velocity = act.velocity;
            if let Some(ms) = command.algo_latency_ms {
                s.algo_latency_ms = ms;
            }
        });
        *inner
            .last_command
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = command;

        if !pause(&token, started + period).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ActuatorSimulator, CommandSource};
    use crate::sensor::SensorSnapshot;
    use crate::snapshot::DoubleBufferChannel;
    use crate::status::StatusStore;
    use crate::testkit::ScriptedLink;
    use crate::wire::{AlgoResult, Message};

    fn publish(ch: &DoubleBufferChannel<SensorSnapshot>, seq: u64) {
        ch.publish(SensorSnapshot {
            seq,
            a: 1.0,
            ..SensorSnapshot::default()
        });
    }

    fn rig(link: Arc<ScriptedLink>) -> (ControlLoop, Arc<DoubleBufferChannel<SensorSnapshot>>, Arc<StatusStore>) {
        let sensor = Arc::new(DoubleBufferChannel::<SensorSnapshot>::default());
        let status = Arc::new(StatusStore::new());
        let cl = ControlLoop::new(
            ControlConfig {
                rate_hz: 500.0,
                ..ControlConfig::default()
            },
            sensor.clone(),
            link,
            Arc::new(ActuatorSimulator::new()),
            status.clone(),
            Bus::new(16),
        );
        (cl, sensor, status)
    }

    #[tokio::test]
    async fn stale_sample_is_not_reprocessed() {
        let link = Arc::new(ScriptedLink::connected());
        let (cl, sensor, _status) = rig(link.clone());
        publish(&sensor, 1);
        assert!(cl.start());
        assert!(!cl.start());

        tokio::time::sleep(Duration::from_millis(60)).await;
        cl.stop().await;

        let frames: Vec<_> = link
            .sent()
            .into_iter()
            .filter(|m| matches!(m, Message::SensorFrame(_)))
            .collect();
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn command_stays_pinned_when_results_stop() {
        let link = Arc::new(ScriptedLink::connected());
        link.push_result(AlgoResult {
            sensor_seq: 1,
            produced_ts_ns: 0,
            out_value: 0.42,
            latency_ms: 3.0,
        });
        let (cl, sensor, status) = rig(link.clone());
        cl.start();

        for seq in 1..=40 {
            publish(&sensor, seq);
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cl.stop().await;

        let cmd = cl.last_command();
        assert_eq!(cmd.value, 0.42);
        assert_eq!(cmd.source, CommandSource::LastKnownGood);
        let s = status.read();
        assert_eq!(s.last_command, 0.42);
        assert_eq!(s.algo_latency_ms, 3.0);
        assert_eq!(s.actuator_velocity, 0.42);
        assert!(s.actuator_position > 0.0);
    }

    #[tokio::test]
    async fn disconnected_worker_yields_zero_command() {
        let link = Arc::new(ScriptedLink::disconnected());
        let (cl, sensor, status) = rig(link.clone());
        publish(&sensor, 1);
        cl.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cl.stop().await;
        cl.stop().await;

        assert!(link.sent().is_empty());
        let cmd = cl.last_command();
        assert_eq!(cmd.value, 0.0);
        assert_eq!(cmd.source, CommandSource::SafeZero);
        assert_eq!(status.read().sensor_seq, 1);
        assert!(!cl.is_running());
    }
}
