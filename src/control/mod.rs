//! Control side of the controller: actuator model, command selection and
//! the sensor-driven loop that ties them to the worker link.

mod actuator;
mod command;
mod control_loop;

pub use actuator::{Actuator, ActuatorSimulator, ActuatorState};
pub use command::{Command, CommandSource};
pub use control_loop::{ControlConfig, ControlLoop};
