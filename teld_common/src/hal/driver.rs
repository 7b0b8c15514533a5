//! Capability traits and error taxonomy.
//!
//! This module defines:
//! - `Transport` trait - Duplex byte channel to one motor controller
//! - `Axis` trait - What the event loop needs from one controllable axis
//! - `CoordinateModel` trait - Sky to hardware count mapping
//! - `TransportError` / `ProtocolError` / `StateError` - The three failure kinds
//! - `AxisError` / `MountError` - Aggregates surfaced to callers

use crate::config::ConfigError;
use crate::hal::types::{AxisId, AxisInfo, AxisMode};
use std::os::fd::RawFd;
use std::time::{Duration, Instant};
use thiserror::Error;

// ─── Errors ─────────────────────────────────────────────────────────

/// Failure of the byte channel itself. Fatal to the current command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Read failed: {0}")]
    Read(String),

    /// No byte arrived within the inter-character timeout.
    #[error("No data within {0:?}")]
    Timeout(Duration),
}

/// Malformed or incomplete reply. The axis state is left unchanged and the
/// next poll retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Short position reply: {got} of 3 bytes")]
    ShortReply { got: usize },

    #[error("Unsolicited {len} byte(s) from controller")]
    Unsolicited { len: usize },
}

/// Request rejected synchronously; nothing was sent to the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("A point-to-point move is in flight")]
    MoveInFlight,

    #[error("Start speed {start} exceeds velocity {velocity}")]
    StartAboveVelocity { start: u32, velocity: u32 },

    #[error("Velocity {velocity} is below start speed {start}")]
    VelocityBelowStart { velocity: u32, start: u32 },

    #[error("A reply is outstanding")]
    Busy,

    #[error("Axis is stopping; finish the kill handshake first")]
    Stopping,

    #[error("Axis has no worm profile")]
    TrackingUnavailable,
}

/// Any failure of a single axis.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl AxisError {
    /// Protocol hiccups are retried by the next poll; everything else is
    /// surfaced to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AxisError::Protocol(_))
    }
}

/// Failure of the mount as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MountError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    #[error("No target set")]
    NoTarget,

    #[error("{axis} axis: {source}")]
    Axis {
        axis: AxisId,
        #[source]
        source: AxisError,
    },
}

impl MountError {
    pub fn axis(axis: AxisId) -> impl FnOnce(AxisError) -> MountError {
        move |source| MountError::Axis { axis, source }
    }
}

// ─── Capabilities ───────────────────────────────────────────────────

/// Duplex byte channel to one axis controller (serial-line semantics).
///
/// Every call returns within its timeout. Timeouts are inter-character:
/// a stalled device yields `TransportError::Timeout`, never a hang.
pub trait Transport {
    /// Write one frame. A partial write is an error.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns as soon as at least one byte is available, or
    /// `TransportError::Timeout` if none arrived within `timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Discard unread input.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Bytes that can be read without waiting.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Readiness handle for the event loop, if the channel has one.
    fn poll_fd(&self) -> Option<RawFd> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        (**self).bytes_available()
    }

    fn poll_fd(&self) -> Option<RawFd> {
        (**self).poll_fd()
    }
}

/// One controllable axis as seen by the event loop.
///
/// The loop never mutates axis state directly: it asks which axes wait for
/// input, polls their handles, and dispatches readiness back.
pub trait Axis {
    fn id(&self) -> AxisId;

    fn mode(&self) -> AxisMode;

    /// Snapshot of the position estimate at `now`.
    fn info(&self, now: Instant) -> AxisInfo;

    /// True while a reply is outstanding.
    fn wants_read(&self) -> bool;

    fn poll_fd(&self) -> Option<RawFd>;

    /// Non-blocking readiness check for channels without a handle.
    fn readable(&mut self) -> Result<bool, AxisError>;

    /// Consume available reply bytes and advance the state machines.
    fn on_readable(&mut self, now: Instant) -> Result<(), AxisError>;

    /// Time-driven work: overdue detection, periodic queries.
    fn tick(&mut self, now: Instant) -> Result<(), AxisError>;

    /// Stop any motion. Idempotent.
    fn stop(&mut self, now: Instant) -> Result<(), AxisError>;
}

/// Maps sky coordinates to hardware counts and back.
///
/// Pointing-model corrections live behind this trait; the motion core only
/// consumes counts.
pub trait CoordinateModel {
    fn sky_to_counts(&self, ra: f64, dec: f64) -> (i64, i64);

    fn counts_to_sky(&self, ra_counts: i64, dec_counts: i64) -> (f64, f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_protocol_errors_retry() {
        assert!(AxisError::from(ProtocolError::ShortReply { got: 2 }).is_retryable());
        assert!(!AxisError::from(TransportError::Write("EIO".into())).is_retryable());
        assert!(!AxisError::from(StateError::MoveInFlight).is_retryable());
    }

    #[test]
    fn test_mount_error_names_axis() {
        let err = MountError::axis(AxisId::Dec)(TransportError::Read("EIO".into()).into());
        assert_eq!(err.to_string(), "DEC axis: Read failed: EIO");
    }
}
