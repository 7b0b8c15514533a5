//! Prelude module for common re-exports.
//!
//! ```rust
//! use teld_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::hal::config::{AxisConfig, MotorProfile, MountConfig, WormProfile};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::hal::driver::{AxisError, MountError, ProtocolError, StateError, TransportError};

// ─── Capabilities ───────────────────────────────────────────────────
pub use crate::hal::driver::{Axis, CoordinateModel, Transport};

// ─── Types ──────────────────────────────────────────────────────────
pub use crate::hal::types::{AxisId, AxisInfo, AxisMode, Direction, GuideSelector, MountInfo};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{HALF_CYCLE, MAX_MOVE, MAX_SEGMENT};
