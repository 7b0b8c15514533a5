//! Driver for the two-axis stepper controller mount.
//!
//! - [`protocol`] - Frame encoding and position reply decoding
//! - [`counter`] - Wrapping register to logical position
//! - [`motion`] - Segmented point-to-point moves
//! - [`tracking`] - Worm program and residual phase
//! - [`guide`] - Guide-rate overlay
//! - [`axis`] - Per-axis controller facade
//! - [`mount`] - Both axes behind one interface
//! - [`serial`] - Serial line transport

pub mod axis;
pub mod counter;
pub mod guide;
pub mod motion;
pub mod mount;
pub mod protocol;
pub mod serial;
pub mod tracking;

pub use axis::{AxisController, Deferred, KillPhases};
pub use counter::AxisCounter;
pub use guide::GuideOverlay;
pub use motion::MotionController;
pub use mount::Mount;
pub use serial::SerialTransport;
pub use tracking::{ResidualPhase, TrackingEngine, TrackingSession};
