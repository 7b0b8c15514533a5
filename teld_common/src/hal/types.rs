//! Axis identity, mode and status types.
//!
//! - `AxisId` - Which of the two mount axes
//! - `AxisMode` - Externally visible state of one axis
//! - `GuideSelector` / `Direction` - Signed motion selectors
//! - `AxisInfo` / `MountInfo` - Published position snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mount axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    /// Hour angle / right ascension. Carries the worm.
    Ra,
    /// Declination.
    Dec,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::Ra, AxisId::Dec];

    pub fn index(self) -> usize {
        match self {
            AxisId::Ra => 0,
            AxisId::Dec => 1,
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisId::Ra => write!(f, "RA"),
            AxisId::Dec => write!(f, "DEC"),
        }
    }
}

/// Externally visible axis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisMode {
    #[default]
    Idle,
    Moving,
    Tracking,
    Guiding,
    /// Kill sent, acknowledgment not yet read.
    Stopping,
}

impl AxisMode {
    /// Rank used to fold per-axis modes into one mount mode.
    fn rank(self) -> u8 {
        match self {
            AxisMode::Idle => 0,
            AxisMode::Tracking => 1,
            AxisMode::Moving => 2,
            AxisMode::Guiding => 3,
            AxisMode::Stopping => 4,
        }
    }

    /// The more significant of two modes.
    pub fn dominant(self, other: AxisMode) -> AxisMode {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Guide rate selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideSelector {
    #[default]
    None,
    Plus,
    Minus,
}

impl GuideSelector {
    pub fn direction(self) -> Direction {
        match self {
            GuideSelector::None => Direction::Stationary,
            GuideSelector::Plus => Direction::Forward,
            GuideSelector::Minus => Direction::Backward,
        }
    }
}

/// Direction hint for counter sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Stationary,
    Forward,
    Backward,
}

impl Direction {
    pub fn of(delta: i64) -> Direction {
        match delta.signum() {
            1 => Direction::Forward,
            -1 => Direction::Backward,
            _ => Direction::Stationary,
        }
    }

    pub fn of_rate(rate: f64) -> Direction {
        if rate > 0.0 {
            Direction::Forward
        } else if rate < 0.0 {
            Direction::Backward
        } else {
            Direction::Stationary
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Direction::Stationary => 0,
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Position snapshot of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisInfo {
    pub axis: AxisId,
    pub mode: AxisMode,
    /// Best position estimate: the last sample, or the extrapolation while a
    /// move is in flight and no fresh sample has arrived.
    pub logical: i64,
    /// Last raw counter sample.
    pub raw: u32,
    pub cycle: i64,
    /// `logical` was extrapolated from elapsed time.
    pub extrapolated: bool,
    /// Steps remaining in the current command, 0 when idle.
    pub in_flight: i64,
    pub tracking_enabled: bool,
    pub guide: GuideSelector,
    /// The move should have finished by now and no reply has arrived.
    pub overdue: bool,
}

/// Position snapshot of the whole mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MountInfo {
    pub mode: AxisMode,
    pub logical_ra: i64,
    pub logical_dec: i64,
    /// Sky position from the coordinate model, degrees.
    pub ra: f64,
    pub dec: f64,
    pub axes: [AxisInfo; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_precedence() {
        assert_eq!(AxisMode::Idle.dominant(AxisMode::Tracking), AxisMode::Tracking);
        assert_eq!(AxisMode::Moving.dominant(AxisMode::Tracking), AxisMode::Moving);
        assert_eq!(AxisMode::Guiding.dominant(AxisMode::Moving), AxisMode::Guiding);
        assert_eq!(AxisMode::Guiding.dominant(AxisMode::Stopping), AxisMode::Stopping);
    }

    #[test]
    fn test_direction_of_delta() {
        assert_eq!(Direction::of(-3), Direction::Backward);
        assert_eq!(Direction::of(0), Direction::Stationary);
        assert_eq!(Direction::of_rate(0.2).sign(), 1);
        assert_eq!(GuideSelector::Minus.direction(), Direction::Backward);
    }
}
