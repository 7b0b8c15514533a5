//! Registry of transport drivers.
//!
//! Maps a driver name from `mount.toml` to a factory that opens one
//! transport per axis. Built at startup and handed to `MountCore` by value;
//! there is no global registry.

use std::collections::HashMap;
use teld_common::hal::config::AxisConfig;
use teld_common::hal::driver::{MountError, Transport, TransportError};
use teld_common::hal::types::AxisId;

/// Factory opening the transport for one axis.
pub type TransportFactory = fn(&AxisConfig) -> Result<Box<dyn Transport>, TransportError>;

pub struct DriverRegistry {
    factories: HashMap<&'static str, TransportFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with `"serial"` and `"simulation"`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_builtin(&mut registry);
        registry
    }

    /// Register a transport factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<TransportFactory> {
        self.factories.get(name).copied()
    }

    /// Look up `name` and open the transport of `axis`.
    ///
    /// # Errors
    /// `MountError::DriverNotFound` for an unknown name, `MountError::Axis`
    /// if the factory cannot open the line.
    pub fn create_transport(
        &self,
        name: &str,
        axis: AxisId,
        config: &AxisConfig,
    ) -> Result<Box<dyn Transport>, MountError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| MountError::DriverNotFound(name.to_string()))?;
        factory(config).map_err(|e| MountError::axis(axis)(e.into()))
    }

    /// List all registered driver names.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
