//! Transport drivers and the mount driver built on them.
//!
//! - [`trencin`] - Stepper controller mount: axis state machines and serial line
//! - [`simulation`] - Software controller and scripted transport
//!
//! # Adding New Transports
//!
//! 1. Implement `Transport` from `teld_common::hal::driver`
//! 2. Provide a `fn(&AxisConfig) -> Result<Box<dyn Transport>, TransportError>` factory
//! 3. Register it in [`register_builtin`]

pub mod simulation;
pub mod trencin;

use crate::driver_registry::DriverRegistry;
use teld_common::hal::config::AxisConfig;
use teld_common::hal::driver::{Transport, TransportError};

fn create_serial(config: &AxisConfig) -> Result<Box<dyn Transport>, TransportError> {
    Ok(Box::new(trencin::SerialTransport::open(config)?))
}

/// Register the built-in transports.
pub fn register_builtin(registry: &mut DriverRegistry) {
    registry.register("serial", create_serial);
    registry.register("simulation", simulation::create_transport);
}
