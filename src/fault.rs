//! Fault injection for exercising the supervisor against a misbehaving worker.
//!
//! Faults are applied by the worker itself: start faults before readiness
//! is signalled, frame faults while serving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Which faults are armed. All off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultConfig {
    /// Abort before signalling readiness.
    pub crash_on_start: bool,
    /// Never signal readiness and never serve.
    pub hang_on_start: bool,
    /// Added to every computation.
    pub extra_delay: Duration,
    /// Abort after serving this many frames.
    pub crash_after_frames: Option<u64>,
}

/// What to do before signalling readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFault {
    None,
    Crash,
    Hang,
}

impl FaultConfig {
    pub fn is_enabled(&self) -> bool {
        *self != FaultConfig::default()
    }

    /// Crash wins over hang when both are armed.
    pub fn start_fault(&self) -> StartFault {
        if self.crash_on_start {
            StartFault::Crash
        } else if self.hang_on_start {
            StartFault::Hang
        } else {
            StartFault::None
        }
    }
}

/// Runtime side of [`FaultConfig`]: counts frames served.
#[derive(Debug, Default)]
pub struct FaultInjector {
    cfg: FaultConfig,
    frames: AtomicU64,
}

impl FaultInjector {
    pub fn new(cfg: FaultConfig) -> Self {
        Self {
            cfg,
            frames: AtomicU64::new(0),
        }
    }

    pub fn extra_delay(&self) -> Duration {
        self.cfg.extra_delay
    }

    /// Records a served frame; true when the worker should crash now.
    pub fn frame_served(&self) -> bool {
        let served = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        self.cfg.crash_after_frames.is_some_and(|limit| served >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disarmed() {
        let cfg = FaultConfig::default();
        assert!(!cfg.is_enabled());
        assert_eq!(cfg.start_fault(), StartFault::None);
        let inj = FaultInjector::new(cfg);
        assert!((0..1000).all(|_| !inj.frame_served()));
    }

    #[test]
    fn crash_takes_precedence_over_hang() {
        let cfg = FaultConfig {
            crash_on_start: true,
            hang_on_start: true,
            ..FaultConfig::default()
        };
        assert!(cfg.is_enabled());
        assert_eq!(cfg.start_fault(), StartFault::Crash);
    }

    #[test]
    fn crash_after_n_frames() {
        let inj = FaultInjector::new(FaultConfig {
            crash_after_frames: Some(3),
            ..FaultConfig::default()
        });
        assert!(!inj.frame_served());
        assert!(!inj.frame_served());
        assert!(inj.frame_served());
    }

    #[test]
    fn injector_exposes_only_runtime_faults() {
        let inj = FaultInjector::new(FaultConfig {
            crash_on_start: true,
            extra_delay: Duration::from_millis(7),
            ..FaultConfig::default()
        });
        assert_eq!(inj.extra_delay(), Duration::from_millis(7));
        assert!(!inj.frame_served(), "start faults do not crash a serving worker");
    }
}
