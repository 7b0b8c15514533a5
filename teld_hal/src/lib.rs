//! # Teld HAL Library
//!
//! Per-axis motion core for a two-axis telescope mount driven by serial
//! stepper controllers.
//!
//! # Module Structure
//!
//! - [`core`] - MountCore struct, readiness event loop
//! - [`driver_registry`] - Transport factory registration
//! - [`drivers`] - Serial controller protocol and simulation transports
//! - [`model`] - Linear sky/count coordinate model
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        teld_hal (single crate)                   │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ mount.toml  │───►│  MountCore   │◄──►│  Driver Registry    │  │
//! │  │(teld_common)│    │ (poll loop)  │    │  serial/simulation  │  │
//! │  └─────────────┘    └──────┬───────┘    └─────────────────────┘  │
//! │                            │                                     │
//! │                            ▼                                     │
//! │                   ┌────────────────┐                             │
//! │                   │     Mount      │ RA + DEC                    │
//! │                   └───────┬────────┘                             │
//! │                           ▼                                      │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │ AxisController: counter · motion · tracking · guide        │  │
//! │  └──────────────────────────┬─────────────────────────────────┘  │
//! │                             ▼                                    │
//! │                   ┌────────────────┐                             │
//! │                   │   Transport    │ (trait object)              │
//! │                   └────────────────┘                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod driver_registry;
pub mod drivers;
pub mod model;

// Re-export key types for convenience
pub use crate::core::{DynMount, LoopStats, MountCore};
pub use crate::driver_registry::{DriverRegistry, TransportFactory};
pub use crate::drivers::trencin::{AxisController, Mount};
pub use crate::model::AxisScaleModel;
