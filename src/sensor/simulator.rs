use std::f64::consts::TAU;
use std::time::Instant;

use rand::Rng;

use crate::clock;

use super::SensorSnapshot;

const NOISE: f64 = 0.02;

/// Three slow sinusoids with a little uniform noise.
///
/// The signal is a function of `seq / rate`, so it does not drift when the
/// producer falls behind; only the timing statistics reflect that.
pub struct SensorSimulator {
    rate_hz: f64,
    seq: u64,
    last: Option<Instant>,
    missed: u64,
    noise: bool,
}

impl SensorSimulator {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz: rate_hz.max(1.0),
            seq: 0,
            last: None,
            missed: 0,
            noise: true,
        }
    }

    /// Same signal without noise.
    pub fn noiseless(rate_hz: f64) -> Self {
        Self {
            noise: false,
            ..Self::new(rate_hz)
        }
    }

    pub fn next_sample(&mut self) -> SensorSnapshot {
        let now = Instant::now();
        let expected = 1.0 / self.rate_hz;
        let mut effective_rate_hz = self.rate_hz;
        if let Some(last) = self.last {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 2.0 * expected {
                self.missed += 1;
            }
            if dt > 0.0 {
                effective_rate_hz = 1.0 / dt;
            }
        }
        self.last = Some(now);

        self.seq += 1;
        let t = self.seq as f64 / self.rate_hz;
        let noisy = self.noise;
        let noise = || {
            if noisy {
                rand::rng().random_range(-NOISE..=NOISE)
            } else {
                0.0
            }
        };

        SensorSnapshot {
            seq: self.seq,
            ts_ns: clock::now_ns(),
            a: (TAU * 0.8 * t).sin() + noise(),
            b: (TAU * 0.3 * t).cos() + noise(),
            c: 0.5 * (TAU * 0.1 * t).sin() + noise(),
            effective_rate_hz,
            missed_deadlines: self.missed,
        }
    }
}
