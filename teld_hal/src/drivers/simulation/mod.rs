//! Transports without hardware.
//!
//! - [`SimulatedController`] - Stepper controller model, used by `--simulate`
//! - [`ScriptedTransport`] - Byte recorder with queued replies, used by tests

mod controller;
mod scripted;

pub use controller::{KILL_ACK, SimulatedController};
pub use scripted::ScriptedTransport;

use teld_common::hal::config::AxisConfig;
use teld_common::hal::driver::{Transport, TransportError};

/// Factory for the `"simulation"` transport driver.
pub fn create_transport(config: &AxisConfig) -> Result<Box<dyn Transport>, TransportError> {
    Ok(Box::new(SimulatedController::new(config.profile)))
}
