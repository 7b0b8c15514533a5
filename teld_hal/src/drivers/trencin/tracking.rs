//! Sidereal ("worm") tracking.
//!
//! The controller runs a looping program that steps the axis at the
//! sidereal rate and reports its position once per loop. On stop the
//! register is re-synchronised to where a perfect sidereal drive would be
//! after the elapsed wall time.

use std::time::Instant;
use teld_common::consts::{MAX_MOVE, SECONDS_PER_DEGREE, SIDEREAL_DAY_SEC, VELOCITY_SCALE};
use teld_common::hal::config::WormProfile;
use teld_common::hal::types::Direction;
use tracing::debug;

use super::counter::AxisCounter;

/// Sidereal drift in steps per second for an axis with `counts_per_degree`.
pub fn sidereal_rate(counts_per_degree: f64) -> f64 {
    counts_per_degree / SECONDS_PER_DEGREE * (86400.0 / SIDEREAL_DAY_SEC)
}

/// Active tracking run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSession {
    pub start_time: Instant,
    pub start_logical: i64,
    pub start_raw: u32,
}

/// Where the counter should be when tracking stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidualPhase {
    pub logical: i64,
    /// Value for the `=` command, in `[0, MAX_MOVE)`.
    pub raw: u32,
}

#[derive(Debug, Clone)]
pub struct TrackingEngine {
    worm: WormProfile,
    rate: f64,
    enabled: bool,
    session: Option<TrackingSession>,
}

impl TrackingEngine {
    pub fn new(worm: WormProfile, counts_per_degree: f64) -> Self {
        Self {
            worm,
            rate: sidereal_rate(counts_per_degree),
            enabled: false,
            session: None,
        }
    }

    pub fn worm(&self) -> &WormProfile {
        &self.worm
    }

    pub fn worm_mut(&mut self) -> &mut WormProfile {
        &mut self.worm
    }

    /// Signed steps per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn direction(&self) -> Direction {
        Direction::of_rate(self.rate)
    }

    /// Tracking requested by the operator.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Record the start of a run at the last known counter value.
    pub fn start(&mut self, counter: &AxisCounter, now: Instant) -> TrackingSession {
        let session = TrackingSession {
            start_time: now,
            start_logical: counter.logical(),
            start_raw: counter.raw(),
        };
        debug!(start_logical = session.start_logical, rate = self.rate, "tracking started");
        self.session = Some(session);
        session
    }

    /// Ideal position after running at the sidereal rate until `now`.
    pub fn residual(&self, now: Instant) -> Option<ResidualPhase> {
        let session = self.session?;
        let elapsed = now.saturating_duration_since(session.start_time).as_secs_f64();
        let travelled = (self.rate * elapsed).round() as i64;
        let logical = session.start_logical + travelled;
        Some(ResidualPhase {
            logical,
            // rem_euclid is in [0, MAX_MOVE).
            raw: logical.rem_euclid(MAX_MOVE) as u32,
        })
    }

    /// End the run, returning the phase to re-synchronise to.
    pub fn stop(&mut self, now: Instant) -> Option<ResidualPhase> {
        let phase = self.residual(now);
        if self.session.take().is_some() {
            debug!(?phase, "tracking stopped");
        }
        phase
    }

    /// Adjust a slew of `diff` steps for the sky moving under it.
    ///
    /// Moving with the drift the target runs away from the axis, against it
    /// the target comes to meet it.
    pub fn compensate_slew(&self, diff: i64, velocity: u32) -> i64 {
        let v = f64::from(velocity) * VELOCITY_SCALE;
        let s = if (self.rate < 0.0) == (diff < 0) {
            -self.rate.abs()
        } else {
            self.rate.abs()
        };
        let scaled = diff as f64 * (v / (v + s)) + 2.0 * s;
        scaled as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RA_CPD: f64 = -56889.0;

    #[test]
    fn test_sidereal_rate() {
        let rate = sidereal_rate(RA_CPD);
        assert!((rate + 237.68).abs() < 0.01, "rate = {rate}");
    }

    #[test]
    fn test_worm_program_runs_at_sidereal_rate() {
        let worm = WormProfile::default();
        let per_second = f64::from(worm.backlash) * 1000.0 / f64::from(worm.wait);
        assert!((per_second - sidereal_rate(RA_CPD).abs()).abs() < 1.0);
    }

    #[test]
    fn test_residual_wraps_into_register() {
        let now = Instant::now();
        let mut counter = AxisCounter::new();
        counter.set_logical(100);
        let mut engine = TrackingEngine::new(WormProfile::default(), RA_CPD);
        engine.start(&counter, now);

        let phase = engine.stop(now + Duration::from_secs(10)).unwrap();
        let travelled = (engine.rate() * 10.0).round() as i64;
        assert_eq!(phase.logical, 100 + travelled);
        assert_eq!(i64::from(phase.raw), (100 + travelled).rem_euclid(MAX_MOVE));
        assert!(!engine.is_active());
        assert_eq!(engine.stop(now), None);
    }

    #[test]
    fn test_compensation_direction() {
        let engine = TrackingEngine::new(WormProfile::default(), RA_CPD);
        // Rate is negative: a negative slew runs with the drift.
        let with_drift = engine.compensate_slew(-100_000, 1500);
        let against = engine.compensate_slew(100_000, 1500);
        assert!((with_drift + 100_723).abs() <= 2, "{with_drift}");
        assert!((against - 100_228).abs() <= 2, "{against}");
    }
}
