//! Guide-rate overlay.
//!
//! Guiding runs the axis continuously at a small velocity until released.
//! On the tracking axis the velocity is nudged by a fixed offset so the
//! correction rides on top of the sky motion.

use teld_common::consts::{MAX_START_SPEED, MIN_GUIDE_VELOCITY, VELOCITY_SCALE};
use teld_common::hal::types::{Direction, GuideSelector};

use super::protocol::SpeedProfile;

/// Acceleration the controller needs for a given start speed.
pub fn acceleration_for_start(start_speed: u32) -> u32 {
    match start_speed {
        0..=30 => 116,
        31..=61 => 464,
        _ => 800,
    }
}

/// Controller velocity for `deg_per_sec` on an axis with `counts_per_degree`.
pub fn velocity_for(deg_per_sec: f64, counts_per_degree: f64) -> u32 {
    let v = deg_per_sec.abs() * counts_per_degree.abs() / VELOCITY_SCALE;
    v.min(f64::from(u32::MAX)) as u32
}

#[derive(Debug, Clone)]
pub struct GuideOverlay {
    selector: GuideSelector,
    velocity: u32,
    offset: u32,
    saved_tracking_was_active: bool,
}

impl GuideOverlay {
    pub fn new(velocity: u32, offset: u32) -> Self {
        Self {
            selector: GuideSelector::None,
            velocity,
            offset,
            saved_tracking_was_active: false,
        }
    }

    pub fn selector(&self) -> GuideSelector {
        self.selector
    }

    pub fn is_active(&self) -> bool {
        self.selector != GuideSelector::None
    }

    pub fn velocity(&self) -> u32 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: u32) {
        self.velocity = velocity;
    }

    pub fn saved_tracking(&self) -> bool {
        self.saved_tracking_was_active
    }

    /// Enter guiding. `tracking_was_active` is kept for the release.
    pub fn engage(&mut self, selector: GuideSelector, tracking_was_active: bool) {
        self.selector = selector;
        self.saved_tracking_was_active |= tracking_was_active;
    }

    /// Leave guiding. Returns whether tracking should resume.
    pub fn release(&mut self) -> bool {
        self.selector = GuideSelector::None;
        std::mem::take(&mut self.saved_tracking_was_active)
    }

    /// Forget the saved tracking flag (tracking was disabled meanwhile).
    pub fn forget_tracking(&mut self) {
        self.saved_tracking_was_active = false;
    }

    pub fn remember_tracking(&mut self) {
        self.saved_tracking_was_active = true;
    }

    /// Speed block for guiding in `selector`'s direction.
    ///
    /// `drift` is the tracking direction, or `None` when tracking is off:
    /// only then is the offset skipped. Guiding against the drift is faster,
    /// guiding with it slower.
    pub fn speed_profile(&self, selector: GuideSelector, drift: Option<Direction>) -> SpeedProfile {
        let mut velocity = self.velocity;
        if let Some(drift) = drift {
            let guide = selector.direction();
            if guide != Direction::Stationary && drift != Direction::Stationary {
                if guide == drift {
                    velocity = velocity.saturating_sub(self.offset);
                } else {
                    velocity = velocity.saturating_add(self.offset);
                }
            }
        }
        let velocity = velocity.max(MIN_GUIDE_VELOCITY);
        let start_speed = velocity.min(MAX_START_SPEED);
        SpeedProfile {
            acceleration: acceleration_for_start(start_speed),
            start_speed,
            velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceleration_table() {
        assert_eq!(acceleration_for_start(16), 116);
        assert_eq!(acceleration_for_start(30), 116);
        assert_eq!(acceleration_for_start(31), 464);
        assert_eq!(acceleration_for_start(61), 464);
        assert_eq!(acceleration_for_start(62), 800);
        assert_eq!(acceleration_for_start(200), 800);
    }

    #[test]
    fn test_guiding_speed_to_velocity() {
        assert_eq!(velocity_for(0.5, -56889.0), 444);
        assert_eq!(velocity_for(0.5, -110222.0), 861);
    }

    #[test]
    fn test_offset_follows_drift() {
        let guide = GuideOverlay::new(444, 4);
        let drift = Some(Direction::Backward);

        let against = guide.speed_profile(GuideSelector::Plus, drift);
        let with = guide.speed_profile(GuideSelector::Minus, drift);
        let untracked = guide.speed_profile(GuideSelector::Plus, None);

        assert_eq!(against.velocity, 448);
        assert_eq!(with.velocity, 440);
        assert_eq!(untracked.velocity, 444);
        assert_eq!(untracked.start_speed, 200);
        assert_eq!(untracked.acceleration, 800);
    }

    #[test]
    fn test_slow_guide_is_clamped() {
        let guide = GuideOverlay::new(3, 4);
        let profile = guide.speed_profile(GuideSelector::Minus, Some(Direction::Backward));
        assert_eq!(profile.velocity, 16);
        assert_eq!(profile.start_speed, 16);
        assert_eq!(profile.acceleration, 116);
    }

    #[test]
    fn test_release_returns_saved_flag_once() {
        let mut guide = GuideOverlay::new(100, 4);
        guide.engage(GuideSelector::Plus, true);
        assert!(guide.is_active());
        assert!(guide.release());
        assert!(!guide.is_active());
        assert!(!guide.release());
    }
}
