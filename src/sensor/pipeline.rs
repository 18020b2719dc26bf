use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::snapshot::DoubleBufferChannel;

use super::{SensorSimulator, SensorSnapshot, SensorSource};

/// Runs a [`SensorSimulator`] at a fixed rate and publishes each sample.
pub struct SensorPipeline {
    channel: Arc<DoubleBufferChannel<SensorSnapshot>>,
    rate_hz: f64,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SensorPipeline {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            channel: Arc::new(DoubleBufferChannel::default()),
            rate_hz: rate_hz.max(1.0),
            running: Mutex::new(None),
        }
    }

    pub fn channel(&self) -> Arc<DoubleBufferChannel<SensorSnapshot>> {
        Arc::clone(&self.channel)
    }

    /// Spawns the generator task; a second call is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let channel = Arc::clone(&self.channel);
        let rate_hz = self.rate_hz;
        let stop = token.clone();
        let task = tokio::spawn(async move {
            let mut sim = SensorSimulator::new(rate_hz);
            let mut tick = tokio::time::interval(Duration::from_secs_f64(1.0 / rate_hz));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tick.tick() => {
                        let sample = sim.next_sample();
                        channel.publish(sample);
                    }
                }
            }
        });
        *running = Some((token, task));
    }

    /// Stops and joins the generator; safe if never started.
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
}

impl SensorSource for SensorPipeline {
    fn latest(&self) -> SensorSnapshot {
        self.channel.read()
    }
}
