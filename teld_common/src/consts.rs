//! System-wide constants for the mount daemon.
//!
//! Single source of truth for the hardware counter width and the motion
//! limits shared by the codec, the counter and the state machines.

use static_assertions::const_assert;
use std::time::Duration;

/// Width `N` of the bounded hardware position register (`2^24 - 1`).
///
/// Raw counts live in `[0, MAX_MOVE)`; the logical position is
/// `cycle * MAX_MOVE + raw`.
pub const MAX_MOVE: i64 = (1 << 24) - 1;

/// Largest step count a single move command may carry.
pub const MAX_SEGMENT: i64 = MAX_MOVE - 1;

/// Wrap detection threshold: a sample jumping by more than this against the
/// known direction of motion is a counter wrap, not noise.
pub const HALF_CYCLE: i64 = MAX_MOVE / 2;

/// In-flight delta used by guiding ("run until stopped").
pub const GUIDE_RUN_SENTINEL: i64 = i64::MAX / 4;

/// Controller velocity unit: one velocity count is 64 microsteps per second.
pub const VELOCITY_SCALE: f64 = 64.0;

/// Fixed overhead added to every travel-time estimate.
pub const MOVE_OVERHEAD: Duration = Duration::from_secs(2);

/// Length of the sidereal day in seconds.
pub const SIDEREAL_DAY_SEC: f64 = 86164.09;

/// Seconds of solar time per degree of hour angle.
pub const SECONDS_PER_DEGREE: f64 = 240.0;

/// Number of bytes in a position reply.
pub const POSITION_REPLY_LEN: usize = 3;

/// Slowest velocity the controller accepts for guiding.
pub const MIN_GUIDE_VELOCITY: u32 = 16;

/// Start/stop speed ceiling.
pub const MAX_START_SPEED: u32 = 200;

/// Default guide velocity adjustment applied on the tracking axis.
pub const DEFAULT_GUIDE_SPEED_OFFSET: u32 = 4;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/teld/mount.toml";

const_assert!(MAX_MOVE < (1 << 24));
const_assert!(MAX_SEGMENT < MAX_MOVE);
const_assert!(GUIDE_RUN_SENTINEL > MAX_MOVE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_width() {
        assert_eq!(MAX_MOVE, 16_777_215);
        assert_eq!(HALF_CYCLE, 8_388_607);
    }

    #[test]
    fn test_position_reply_fits_counter() {
        let max_reply = (1i64 << (8 * POSITION_REPLY_LEN)) - 1;
        assert_eq!(max_reply, MAX_MOVE);
    }
}
