use std::sync::Mutex;

/// Position/velocity of the driven axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorState {
    pub position: f64,
    pub velocity: f64,
}

/// Consumer of control commands.
pub trait Actuator: Send + Sync + 'static {
    /// Applies `command` for `dt` seconds.
    fn apply(&self, command: f64, dt: f64);

    fn state(&self) -> ActuatorState;
}

/// Velocity-commanded integrator: `velocity = command`, `position += velocity * dt`.
#[derive(Debug, Default)]
pub struct ActuatorSimulator {
    state: Mutex<ActuatorState>,
}

impl ActuatorSimulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actuator for ActuatorSimulator {
    fn apply(&self, command: f64, dt: f64) {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        s.velocity = command;
        s.position += s.velocity * dt.max(0.0);
    }

    fn state(&self) -> ActuatorState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
