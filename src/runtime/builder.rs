use std::sync::Arc;

use crate::config::Config;
use crate::control::{Actuator, ActuatorSimulator, ControlLoop};
use crate::events::Bus;
use crate::heartbeat::HeartbeatMonitor;
use crate::lifecycle::{Lifecycle, ProcessLauncher, ProcessManager};
use crate::sensor::{SensorPipeline, SensorSource};
use crate::status::{StatusSink, StatusStore};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::{Client, WorkerLink};

use super::controller::{ControllerRuntime, Parts};

/// Wires a [`ControllerRuntime`] from a [`Config`] and optional collaborators.
///
/// Anything not supplied gets the stock implementation: a TCP [`Client`], a
/// [`ProcessManager`] launching `cfg.worker`, a [`SensorPipeline`] at
/// `cfg.sensor_rate_hz`, an [`ActuatorSimulator`] and a [`StatusStore`].
///
/// A custom lifecycle should drive the same link passed to
/// [`with_link`](Self::with_link); the builder cannot check that.
pub struct RuntimeBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    link: Option<Arc<dyn WorkerLink>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    sensor: Option<Arc<dyn SensorSource>>,
    actuator: Option<Arc<dyn Actuator>>,
    status: Option<Arc<dyn StatusSink>>,
}

impl RuntimeBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            link: None,
            lifecycle: None,
            sensor: None,
            actuator: None,
            status: None,
        }
    }

    /// Event subscribers, each with its own queue and worker.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn with_link(mut self, link: Arc<dyn WorkerLink>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// External sensor; the built-in generator is then not started.
    pub fn with_sensor(mut self, sensor: Arc<dyn SensorSource>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_actuator(mut self, actuator: Arc<dyn Actuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    /// Builds the runtime and spawns its subscriber workers.
    ///
    /// Must be called inside a Tokio runtime. Nothing else runs until
    /// [`ControllerRuntime::start`].
    pub fn build(self) -> ControllerRuntime {
        let cfg = self.cfg;
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        let link = self
            .link
            .unwrap_or_else(|| Arc::new(Client::new()) as Arc<dyn WorkerLink>);
        let lifecycle = self.lifecycle.unwrap_or_else(|| {
            Arc::new(ProcessManager::new(
                cfg.lifecycle(),
                Arc::clone(&link),
                Arc::new(ProcessLauncher::new(cfg.worker.clone())),
                bus.clone(),
            ))
        });

        let (sensor, owned_sensor): (Arc<dyn SensorSource>, _) = match self.sensor {
            Some(s) => (s, None),
            None => {
                let pipeline = Arc::new(SensorPipeline::new(cfg.sensor_rate_hz));
                (Arc::clone(&pipeline) as Arc<dyn SensorSource>, Some(pipeline))
            }
        };
        let actuator = self
            .actuator
            .unwrap_or_else(|| Arc::new(ActuatorSimulator::new()));
        let status = self
            .status
            .unwrap_or_else(|| Arc::new(StatusStore::new()));

        let heartbeat = HeartbeatMonitor::new(cfg.heartbeat, Arc::clone(&link), bus.clone());
        let control = ControlLoop::new(
            cfg.control,
            sensor,
            Arc::clone(&link),
            actuator,
            Arc::clone(&status),
            bus.clone(),
        );

        ControllerRuntime::new(
            Parts {
                cfg: cfg.supervision,
                bus,
                link,
                lifecycle,
                heartbeat,
                control,
                sensor: owned_sensor,
                status,
            },
            subs,
        )
    }
}
