//! Wrapping hardware counter to unbounded logical position.
//!
//! The controller reports a 24-bit register that wraps at `MAX_MOVE`. The
//! axis keeps a signed cycle count next to the last raw sample so that
//! `logical = cycle * MAX_MOVE + raw` follows the physical displacement.

use teld_common::consts::{HALF_CYCLE, MAX_MOVE};
use teld_common::hal::types::Direction;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisCounter {
    raw: u32,
    cycle: i64,
}

impl AxisCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn cycle(&self) -> i64 {
        self.cycle
    }

    pub fn logical(&self) -> i64 {
        self.cycle * MAX_MOVE + i64::from(self.raw)
    }

    /// Feed a periodic sample taken while the axis runs in `direction`.
    ///
    /// A jump of more than half a cycle against the direction of motion is a
    /// wrap of the register. With no direction the cycle is left alone.
    pub fn update(&mut self, sample: u32, direction: Direction) {
        let sample = normalize(sample);
        let prev = i64::from(self.raw);
        let next = i64::from(sample);
        match direction {
            Direction::Backward if next - prev > HALF_CYCLE => {
                self.cycle -= 1;
                debug!(prev, next, cycle = self.cycle, "counter wrapped backward");
            }
            Direction::Forward if prev - next > HALF_CYCLE => {
                self.cycle += 1;
                debug!(prev, next, cycle = self.cycle, "counter wrapped forward");
            }
            _ => {}
        }
        self.raw = sample;
    }

    /// Place `sample` in the cycle that brings it closest to `expected`.
    ///
    /// Used when a move of up to a full cycle completes: the half-cycle rule
    /// cannot tell a long move from a wrap, but the commanded end point can.
    pub fn resolve_near(&mut self, sample: u32, expected: i64) {
        let sample = normalize(sample);
        self.cycle = expected
            .saturating_sub(i64::from(sample))
            .saturating_add(HALF_CYCLE)
            .div_euclid(MAX_MOVE);
        self.raw = sample;
    }

    /// Force the logical position, e.g. after `=` re-synchronised the register.
    pub fn set_logical(&mut self, logical: i64) {
        self.cycle = logical.div_euclid(MAX_MOVE);
        // rem_euclid is in [0, MAX_MOVE), which fits in 24 bits.
        self.raw = logical.rem_euclid(MAX_MOVE) as u32;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The register is 24 bits wide but counts modulo `MAX_MOVE`.
fn normalize(sample: u32) -> u32 {
    (i64::from(sample) % MAX_MOVE) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: u32 = MAX_MOVE as u32;

    #[test]
    fn test_backward_wrap_sequence() {
        let mut counter = AxisCounter::new();
        counter.update(100, Direction::Stationary);

        let mut logical = vec![counter.logical()];
        for sample in [50, 10, N - 5, N - 50] {
            counter.update(sample, Direction::Backward);
            logical.push(counter.logical());
        }

        assert_eq!(logical, vec![100, 50, 10, -5, -50]);
        assert_eq!(counter.cycle(), -1);
    }

    #[test]
    fn test_forward_wrap() {
        let mut counter = AxisCounter::new();
        counter.update(N - 10, Direction::Stationary);
        counter.update(20, Direction::Forward);
        assert_eq!(counter.logical(), i64::from(N) + 20);
    }

    #[test]
    fn test_sweep_follows_displacement() {
        let offsets = [0, MAX_MOVE - 7, HALF_CYCLE, -3 * MAX_MOVE + 11];
        for step in [1, 997, 250_000, 4_000_003, HALF_CYCLE - 1] {
            let samples = (3 * MAX_MOVE / step).min(100_000);
            for start in offsets {
                for (direction, sign) in [(Direction::Forward, 1), (Direction::Backward, -1)] {
                    let mut counter = AxisCounter::new();
                    counter.set_logical(start);
                    let mut position = start;
                    for _ in 0..samples {
                        position += sign * step;
                        counter.update(position.rem_euclid(MAX_MOVE) as u32, direction);
                        assert_eq!(
                            counter.logical(),
                            position,
                            "step {step} from {start} {direction:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_stationary_never_changes_cycle() {
        let mut counter = AxisCounter::new();
        counter.update(10, Direction::Stationary);
        counter.update(N - 10, Direction::Stationary);
        assert_eq!(counter.cycle(), 0);
    }

    #[test]
    fn test_noise_against_direction_is_not_a_wrap() {
        let mut counter = AxisCounter::new();
        counter.update(5000, Direction::Stationary);
        counter.update(5010, Direction::Backward);
        assert_eq!(counter.cycle(), 0);
        assert_eq!(counter.logical(), 5010);
    }

    #[test]
    fn test_resolve_near_long_move() {
        let mut counter = AxisCounter::new();
        counter.set_logical(100);
        // Move of almost a full cycle backward ends just above zero of the
        // previous cycle.
        let expected = 100 - (MAX_MOVE - 1);
        counter.resolve_near(expected.rem_euclid(MAX_MOVE) as u32, expected);
        assert_eq!(counter.logical(), expected);
        assert_eq!(counter.cycle(), -1);
    }

    #[test]
    fn test_resolve_near_tolerates_slip() {
        let mut counter = AxisCounter::new();
        counter.resolve_near(N - 5, 3);
        assert_eq!(counter.logical(), -5);
    }

    #[test]
    fn test_set_logical_negative() {
        let mut counter = AxisCounter::new();
        counter.set_logical(-1);
        assert_eq!(counter.cycle(), -1);
        assert_eq!(counter.raw(), N - 1);
        assert_eq!(counter.logical(), -1);
    }
}
