//! Point-to-point motion: Idle ⇄ Moving.
//!
//! A move of any length is split into segments of at most `MAX_SEGMENT`
//! steps, since the controller register cannot hold more. Each segment is
//! one `[ F|B n r U ]` block; its completion reply starts the next one.
//! Between replies the position is extrapolated from elapsed time.

use std::time::{Duration, Instant};
use teld_common::consts::{MAX_SEGMENT, MOVE_OVERHEAD, VELOCITY_SCALE};
use tracing::debug;

/// Estimated duration of a `steps` move at controller velocity `velocity`.
///
/// `MOVE_OVERHEAD` is slack for the completion deadline only; the position
/// estimate in [`MotionController::extrapolate`] does not include it.
pub fn travel_time(steps: i64, velocity: u32) -> Duration {
    let rate = VELOCITY_SCALE * f64::from(velocity.max(1));
    MOVE_OVERHEAD + Duration::from_secs_f64(steps.unsigned_abs() as f64 / rate)
}

fn clamp_segment(delta: i64) -> i64 {
    delta.clamp(-MAX_SEGMENT, MAX_SEGMENT)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    delta: i64,
    start_logical: i64,
    issued_at: Instant,
    expected_end: Instant,
}

/// Per-axis move state.
#[derive(Debug, Clone, Default)]
pub struct MotionController {
    /// Logical end point of the whole move.
    target: i64,
    velocity: u32,
    segment: Option<Segment>,
}

impl MotionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_moving(&self) -> bool {
        self.segment.is_some()
    }

    /// Steps of the command in flight, 0 when idle.
    pub fn in_flight(&self) -> i64 {
        self.segment.map_or(0, |s| s.delta)
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn expected_end(&self) -> Option<Instant> {
        self.segment.map(|s| s.expected_end)
    }

    /// Idle → Moving. Returns the first segment to send.
    pub fn begin(&mut self, start_logical: i64, delta: i64, velocity: u32, now: Instant) -> i64 {
        self.target = start_logical.saturating_add(delta);
        self.velocity = velocity;
        self.issue(start_logical, now)
    }

    fn issue(&mut self, start_logical: i64, now: Instant) -> i64 {
        let delta = clamp_segment(self.target.saturating_sub(start_logical));
        let expected_end = now + travel_time(delta, self.velocity);
        self.segment = Some(Segment {
            delta,
            start_logical,
            issued_at: now,
            expected_end,
        });
        debug!(delta, start_logical, target = self.target, "segment issued");
        delta
    }

    /// Where the segment in flight will end.
    pub fn expected_logical(&self) -> Option<i64> {
        self.segment.map(|s| s.start_logical.saturating_add(s.delta))
    }

    /// The controller reported the end of the segment at `end_logical`.
    ///
    /// Returns the next segment if residual remains; otherwise the move is
    /// over and the controller goes back to Idle.
    pub fn segment_complete(&mut self, end_logical: i64, now: Instant) -> Option<i64> {
        if self.segment.is_none() {
            return None;
        }
        if self.target == end_logical {
            self.segment = None;
            debug!(end_logical, "move complete");
            return None;
        }
        Some(self.issue(end_logical, now))
    }

    /// Position estimate from elapsed time.
    ///
    /// `start + delta * (1 - remaining / |delta|)` with `remaining` derived
    /// from the configured velocity and clamped to the segment. Travel is
    /// counted from the moment the segment was issued, without the
    /// `MOVE_OVERHEAD` allowance, so the estimate reaches the segment end
    /// before `expected_end` and holds there.
    pub fn extrapolate(&self, now: Instant) -> Option<i64> {
        let seg = self.segment?;
        let span = seg.delta.unsigned_abs() as f64;
        if span == 0.0 {
            return Some(seg.start_logical);
        }
        let elapsed = now.saturating_duration_since(seg.issued_at).as_secs_f64();
        let travelled = elapsed * VELOCITY_SCALE * f64::from(self.velocity);
        let remaining = (span - travelled).clamp(0.0, span);
        let done = seg.delta as f64 * (1.0 - remaining / span);
        Some(seg.start_logical + done.round() as i64)
    }

    /// Drop the move (after a kill).
    pub fn cancel(&mut self) {
        if let Some(seg) = self.segment.take() {
            debug!(delta = seg.delta, "move cancelled");
        }
    }

    /// The segment should have ended more than `grace` ago.
    pub fn overdue(&self, now: Instant, grace: Duration) -> bool {
        self.segment.is_some_and(|s| now > s.expected_end + grace)
    }
}
