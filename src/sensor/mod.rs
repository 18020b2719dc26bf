//! Sensor input collaborators.
//!
//! - [`SensorSource`] what the control loop reads from
//! - [`SensorSimulator`] deterministic-plus-noise sample generator
//! - [`SensorPipeline`] generator task publishing into a [`DoubleBufferChannel`]

mod pipeline;
mod simulator;

pub use pipeline::SensorPipeline;
pub use simulator::SensorSimulator;

use crate::snapshot::DoubleBufferChannel;

/// Latest sensor reading plus producer-side timing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub seq: u64,
    pub ts_ns: u64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Instantaneous production rate (1 / last interval).
    pub effective_rate_hz: f64,
    /// Intervals longer than twice the nominal period.
    pub missed_deadlines: u64,
}

/// Source of sensor snapshots. `latest` must not block.
pub trait SensorSource: Send + Sync + 'static {
    fn latest(&self) -> SensorSnapshot;
}

impl SensorSource for DoubleBufferChannel<SensorSnapshot> {
    fn latest(&self) -> SensorSnapshot {
        self.read()
    }
}
