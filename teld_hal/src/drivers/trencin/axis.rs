//! Per-axis controller: one transport, one counter, the motion modes.
//!
//! The controller never waits for a reply. Commands go out, `pending`
//! records what the next three bytes will mean, and the event loop calls
//! [`AxisController::on_readable`] when they arrive. A command that needs
//! the line while a position report is outstanding is queued and replayed
//! after the report, so writes and reads on one axis never interleave.

use bitflags::bitflags;
use heapless::Deque;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};
use teld_common::consts::{
    DEFAULT_GUIDE_SPEED_OFFSET, GUIDE_RUN_SENTINEL, MAX_MOVE, POSITION_REPLY_LEN,
};
use teld_common::hal::config::{AxisConfig, MotorProfile, WormProfile};
use teld_common::hal::driver::{Axis, AxisError, ProtocolError, StateError, Transport, TransportError};
use teld_common::hal::types::{AxisId, AxisInfo, AxisMode, Direction, GuideSelector};
use tracing::{debug, info, trace, warn};

use super::counter::AxisCounter;
use super::guide::{GuideOverlay, velocity_for};
use super::motion::MotionController;
use super::protocol::{
    self, Command, ReplyAssembler, SpeedProfile, move_block, profile_frames, query_block,
    speed_block, worm_block,
};
use super::tracking::TrackingEngine;

const DEFERRED_CAPACITY: usize = 4;

bitflags! {
    /// Phases of the kill handshake. Each can be retried on its own.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KillPhases: u8 {
        /// Send `K`.
        const SEND = 0x01;
        /// Read the one-byte acknowledgment and flush.
        const ACK = 0x02;
    }
}

/// Meaning of the next position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    /// `[ U ]` sent. `expected` is the extrapolated position after a kill.
    Query { expected: Option<i64> },
    /// Move segment in flight; the report marks its end.
    Segment,
    /// Completion report lost or garbled: `[ U ]` sent to read where the
    /// segment ended. The report is handled like a completion.
    SegmentCheck,
    /// Worm program running; reports arrive once per loop.
    Worm,
}

/// Command waiting for the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    MoveBy(i64),
    MoveTo(i64),
    Park,
    Track,
    Guide(GuideSelector),
    Sync(i64),
}

pub struct AxisController<T: Transport> {
    id: AxisId,
    name: String,
    transport: T,
    counter: AxisCounter,
    motion: MotionController,
    tracking: Option<TrackingEngine>,
    guide: GuideOverlay,
    profile: MotorProfile,
    counts_per_degree: f64,
    inter_byte_timeout: Duration,
    kill_ack_timeout: Duration,
    info_interval: Duration,
    pending: Pending,
    deferred: Deque<Deferred, DEFERRED_CAPACITY>,
    reply: ReplyAssembler,
    /// `K` sent, acknowledgment not read yet.
    stopping: bool,
    kill_position: Option<i64>,
    parking: bool,
    last_query: Option<Instant>,
    overdue_reported: bool,
}

impl<T: Transport> AxisController<T> {
    pub fn new(id: AxisId, config: &AxisConfig, transport: T) -> Self {
        let tracking = config
            .worm
            .map(|worm| TrackingEngine::new(worm, config.counts_per_degree));
        Self {
            id,
            name: config.name.clone(),
            transport,
            counter: AxisCounter::new(),
            motion: MotionController::new(),
            tracking,
            guide: GuideOverlay::new(
                velocity_for(0.5, config.counts_per_degree),
                DEFAULT_GUIDE_SPEED_OFFSET,
            ),
            profile: config.profile,
            counts_per_degree: config.counts_per_degree,
            inter_byte_timeout: Duration::from_millis(config.inter_byte_timeout_ms),
            kill_ack_timeout: Duration::from_millis(config.kill_ack_timeout_ms),
            info_interval: Duration::from_secs(1),
            pending: Pending::None,
            deferred: Deque::new(),
            reply: ReplyAssembler::new(),
            stopping: false,
            kill_position: None,
            parking: false,
            last_query: None,
            overdue_reported: false,
        }
    }

    /// Guiding speed in deg/s and the velocity offset for the tracking axis.
    pub fn with_guide(mut self, deg_per_sec: f64, offset: u32) -> Self {
        self.guide = GuideOverlay::new(velocity_for(deg_per_sec, self.counts_per_degree), offset);
        self
    }

    /// How often an idle axis re-reads its position.
    pub fn with_info_interval(mut self, interval: Duration) -> Self {
        self.info_interval = interval;
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counter(&self) -> &AxisCounter {
        &self.counter
    }

    pub fn profile(&self) -> &MotorProfile {
        &self.profile
    }

    pub fn tracking(&self) -> Option<&TrackingEngine> {
        self.tracking.as_ref()
    }

    pub fn guide(&self) -> &GuideOverlay {
        &self.guide
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn mode(&self) -> AxisMode {
        if self.stopping {
            AxisMode::Stopping
        } else if self.guide.is_active() {
            AxisMode::Guiding
        } else if self.motion.is_moving() {
            AxisMode::Moving
        } else if self.tracking.as_ref().is_some_and(TrackingEngine::is_active) {
            AxisMode::Tracking
        } else {
            AxisMode::Idle
        }
    }

    pub fn info(&self, now: Instant) -> AxisInfo {
        AxisInfo {
            axis: self.id,
            mode: self.mode(),
            logical: self.current_logical(now),
            raw: self.counter.raw(),
            cycle: self.counter.cycle(),
            extrapolated: self.motion.is_moving(),
            in_flight: self.motion.in_flight(),
            tracking_enabled: self.tracking_enabled(),
            guide: self.guide.selector(),
            overdue: self.motion.overdue(now, self.inter_byte_timeout),
        }
    }

    pub fn wants_read(&self) -> bool {
        !self.stopping && self.pending != Pending::None
    }

    pub fn poll_fd(&self) -> Option<RawFd> {
        self.transport.poll_fd()
    }

    fn tracking_enabled(&self) -> bool {
        self.tracking.as_ref().is_some_and(TrackingEngine::enabled)
    }

    /// Hardware sample, or the extrapolation while a command is in flight.
    fn current_logical(&self, now: Instant) -> i64 {
        self.motion
            .extrapolate(now)
            .unwrap_or_else(|| self.counter.logical())
    }

    // ─── Line ───────────────────────────────────────────────────────

    fn send(&mut self, commands: &[Command]) -> Result<(), TransportError> {
        let bytes = protocol::encode_all(commands);
        debug!(
            axis = %self.id,
            frames = %commands.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
            "send"
        );
        trace!(axis = %self.id, bytes = ?String::from_utf8_lossy(&bytes));
        self.transport.send(&bytes)
    }

    fn send_query(&mut self, expected: Option<i64>, now: Instant) -> Result<(), AxisError> {
        self.send(&query_block())?;
        self.pending = Pending::Query { expected };
        self.last_query = Some(now);
        Ok(())
    }

    fn base_speed(&self) -> SpeedProfile {
        SpeedProfile::from(&self.profile)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Kill any leftover motion, program the base profile, read the position.
    pub fn init(&mut self, now: Instant) -> Result<(), AxisError> {
        info!(axis = %self.id, name = %self.name, "initialising motor controller");
        self.transport.flush()?;
        self.kill(KillPhases::all(), now)?;
        self.kill_position = None;
        self.send(&profile_frames(&self.profile))?;
        self.send_query(None, now)
    }

    /// Reset the counter reference and re-program the controller.
    pub fn reset(&mut self, now: Instant) -> Result<(), AxisError> {
        self.deferred.clear();
        self.parking = false;
        self.halt_motion(now)?;
        if let Some(engine) = self.tracking.as_mut() {
            engine.stop(now);
        }
        self.guide.release();
        self.reply.clear();
        self.pending = Pending::None;
        self.kill_position = None;

        self.send(&[Command::ResetReference])?;
        self.transport.flush()?;
        self.counter.reset();
        self.send(&profile_frames(&self.profile))?;
        info!(axis = %self.id, "counter reference reset");
        self.send_query(None, now)
    }

    // ─── Kill / stop ────────────────────────────────────────────────

    /// Run the requested phases of the kill handshake.
    ///
    /// A failed `ACK` leaves the axis in `Stopping`; call again with `ACK`
    /// (or `stop`) to finish. The `ACK` read blocks the calling thread for
    /// up to `kill_ack_timeout_ms`.
    pub fn kill(&mut self, phases: KillPhases, now: Instant) -> Result<(), AxisError> {
        if phases.contains(KillPhases::SEND) {
            let at = self.current_logical(now);
            self.send(&[Command::Kill])?;
            self.motion.cancel();
            self.reply.clear();
            self.pending = Pending::None;
            self.stopping = true;
            self.kill_position = Some(at);
            debug!(axis = %self.id, at, "kill sent");
        }
        if phases.contains(KillPhases::ACK) && self.stopping {
            let mut ack = [0u8; 1];
            self.transport.receive(&mut ack, self.kill_ack_timeout)?;
            self.transport.flush()?;
            self.stopping = false;
            debug!(axis = %self.id, ack = ack[0], "kill acknowledged");
        }
        Ok(())
    }

    /// Finish whatever kill is needed. True if the position must be re-read.
    fn halt_motion(&mut self, now: Instant) -> Result<bool, AxisError> {
        if self.motion.is_moving() {
            self.kill(KillPhases::all(), now)?;
            Ok(true)
        } else if self.stopping {
            self.kill(KillPhases::ACK, now)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Stop all motion. Idempotent: an idle axis sends nothing.
    ///
    /// Ending a guide excursion that had suspended tracking resumes it;
    /// every other path ends Idle. Stopping a moving axis waits for the kill
    /// acknowledgment, up to `kill_ack_timeout_ms`.
    pub fn stop(&mut self, now: Instant) -> Result<(), AxisError> {
        self.deferred.clear();
        self.parking = false;
        let was_guiding = self.guide.is_active();
        let killed = self.halt_motion(now)?;
        let resume = if was_guiding {
            self.send(&speed_block(self.base_speed()))?;
            self.guide.release()
        } else {
            false
        };
        self.stop_tracking_session(now)?;
        if killed {
            let expected = self.kill_position.take();
            self.send_query(expected, now)?;
            if resume {
                self.defer(Deferred::Track)?;
            }
        }
        Ok(())
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Relative move of `delta` steps.
    pub fn start_move(&mut self, delta: i64, now: Instant) -> Result<(), AxisError> {
        if delta == 0 {
            return Ok(());
        }
        self.dispatch(Deferred::MoveBy(delta), now)
    }

    /// Move to an absolute logical position.
    pub fn move_to(&mut self, target: i64, now: Instant) -> Result<(), AxisError> {
        self.dispatch(Deferred::MoveTo(target), now)
    }

    /// Move to logical 0 without resuming tracking afterwards.
    pub fn park(&mut self, now: Instant) -> Result<(), AxisError> {
        self.dispatch(Deferred::Park, now)
    }

    /// Declare the current position to be `logical` (`=` command).
    pub fn sync(&mut self, logical: i64, now: Instant) -> Result<(), AxisError> {
        self.dispatch(Deferred::Sync(logical), now)
    }

    pub fn start_tracking(&mut self, now: Instant) -> Result<(), AxisError> {
        if self.tracking.is_none() {
            return Err(StateError::TrackingUnavailable.into());
        }
        if self.motion.is_moving() && !self.guide.is_active() {
            return Err(StateError::MoveInFlight.into());
        }
        self.dispatch(Deferred::Track, now)
    }

    /// Halt the worm and re-synchronise the counter to the residual phase.
    pub fn stop_tracking(&mut self, now: Instant) -> Result<(), AxisError> {
        if self.stopping {
            return Err(StateError::Stopping.into());
        }
        self.stop_tracking_session(now)?;
        self.drain(now)
    }

    pub fn set_tracking_enabled(&mut self, enabled: bool, now: Instant) -> Result<(), AxisError> {
        let Some(engine) = self.tracking.as_mut() else {
            return if enabled {
                Err(StateError::TrackingUnavailable.into())
            } else {
                Ok(())
            };
        };
        engine.set_enabled(enabled);
        info!(axis = %self.id, enabled, "tracking");

        if enabled {
            return match self.mode() {
                AxisMode::Idle => self.dispatch(Deferred::Track, now),
                AxisMode::Guiding => {
                    self.guide.remember_tracking();
                    Ok(())
                }
                // Moves start tracking when they end.
                _ => Ok(()),
            };
        }

        self.guide.forget_tracking();
        self.drop_deferred(|cmd| cmd == Deferred::Track);
        self.stop_tracking_session(now)?;
        Ok(())
    }

    /// Enter, change or leave guiding.
    pub fn set_guide(&mut self, selector: GuideSelector, now: Instant) -> Result<(), AxisError> {
        self.dispatch(Deferred::Guide(selector), now)
    }

    /// New guiding speed in deg/s. An active guide restarts at the new speed.
    pub fn set_guide_speed(&mut self, deg_per_sec: f64, now: Instant) -> Result<(), AxisError> {
        self.guide
            .set_velocity(velocity_for(deg_per_sec, self.counts_per_degree));
        let selector = self.guide.selector();
        if selector == GuideSelector::None {
            return Ok(());
        }
        self.halt_motion(now)?;
        if self.guide.release() {
            self.guide.remember_tracking();
        }
        let expected = self.kill_position.take();
        self.send_query(expected, now)?;
        self.defer(Deferred::Guide(selector))
    }

    /// Request a position report if the line is free.
    pub fn query_position(&mut self, now: Instant) -> Result<(), AxisError> {
        if self.stopping {
            return Err(StateError::Stopping.into());
        }
        match self.pending {
            Pending::None => self.send_query(None, now),
            // A report is already on its way.
            _ => Ok(()),
        }
    }

    // ─── Parameters ─────────────────────────────────────────────────

    fn ensure_quiet(&self) -> Result<(), StateError> {
        if self.stopping {
            Err(StateError::Stopping)
        } else if self.pending != Pending::None {
            Err(StateError::Busy)
        } else {
            Ok(())
        }
    }

    fn set_parameter(
        &mut self,
        command: Command,
        apply: impl FnOnce(&mut MotorProfile),
    ) -> Result<(), AxisError> {
        self.ensure_quiet()?;
        self.send(&[command])?;
        apply(&mut self.profile);
        Ok(())
    }

    pub fn set_velocity(&mut self, velocity: u32) -> Result<(), AxisError> {
        let start = self.profile.start_speed;
        if velocity < start {
            return Err(StateError::VelocityBelowStart { velocity, start }.into());
        }
        self.set_parameter(Command::Velocity(velocity), |p| p.velocity = velocity)
    }

    pub fn set_start_speed(&mut self, start: u32) -> Result<(), AxisError> {
        let velocity = self.profile.velocity;
        if start > velocity {
            return Err(StateError::StartAboveVelocity { start, velocity }.into());
        }
        self.set_parameter(Command::StartSpeed(start), |p| p.start_speed = start)
    }

    pub fn set_acceleration(&mut self, acceleration: u32) -> Result<(), AxisError> {
        self.set_parameter(Command::Acceleration(acceleration), |p| {
            p.acceleration = acceleration
        })
    }

    pub fn set_microstep(&mut self, microstep: u32) -> Result<(), AxisError> {
        self.set_parameter(Command::Microstep(microstep), |p| p.microstep = microstep)
    }

    pub fn set_shape(&mut self, shape: u32) -> Result<(), AxisError> {
        self.set_parameter(Command::Shape(shape), |p| p.shape = shape)
    }

    pub fn set_qualification(&mut self, qualification: u32) -> Result<(), AxisError> {
        self.set_parameter(Command::Qualification(qualification), |p| {
            p.qualification = qualification
        })
    }

    /// Replace the worm program parameters; a running worm restarts with them.
    pub fn set_worm_profile(&mut self, worm: WormProfile, now: Instant) -> Result<(), AxisError> {
        let Some(engine) = self.tracking.as_mut() else {
            return Err(StateError::TrackingUnavailable.into());
        };
        *engine.worm_mut() = worm;
        if engine.is_active() {
            self.stop_tracking_session(now)?;
            self.start_tracking_now(now)?;
        }
        Ok(())
    }

    // ─── Dispatch ───────────────────────────────────────────────────

    fn dispatch(&mut self, cmd: Deferred, now: Instant) -> Result<(), AxisError> {
        if self.stopping {
            return Err(StateError::Stopping.into());
        }
        if let Pending::Query { .. } = self.pending {
            return self.defer(cmd);
        }
        self.execute(cmd, now)
    }

    fn defer(&mut self, cmd: Deferred) -> Result<(), AxisError> {
        self.deferred
            .push_back(cmd)
            .map_err(|_| StateError::Busy)?;
        debug!(axis = %self.id, ?cmd, "deferred until position report");
        Ok(())
    }

    fn drop_deferred(&mut self, reject: impl Fn(Deferred) -> bool) {
        for _ in 0..self.deferred.len() {
            if let Some(cmd) = self.deferred.pop_front() {
                if !reject(cmd) {
                    // Same length as before; cannot overflow.
                    let _ = self.deferred.push_back(cmd);
                }
            }
        }
    }

    /// Replay queued commands until one needs the line again.
    fn drain(&mut self, now: Instant) -> Result<(), AxisError> {
        while !self.stopping && !matches!(self.pending, Pending::Query { .. }) {
            let Some(cmd) = self.deferred.pop_front() else {
                break;
            };
            match self.execute(cmd, now) {
                Err(AxisError::State(e)) => {
                    warn!(axis = %self.id, ?cmd, error = %e, "deferred command rejected");
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn execute(&mut self, cmd: Deferred, now: Instant) -> Result<(), AxisError> {
        match cmd {
            Deferred::MoveBy(_) | Deferred::MoveTo(_) | Deferred::Park => {
                if self.clear_for(cmd, now)? {
                    return Ok(());
                }
                let (target, parking) = match cmd {
                    Deferred::MoveBy(delta) => {
                        (self.counter.logical().saturating_add(delta), false)
                    }
                    Deferred::MoveTo(target) => (target, false),
                    _ => (0, true),
                };
                self.begin_move(target, parking, now)
            }
            Deferred::Sync(logical) => {
                if self.clear_for(cmd, now)? {
                    return Ok(());
                }
                // rem_euclid is in [0, MAX_MOVE).
                let raw = logical.rem_euclid(MAX_MOVE) as u32;
                self.send(&[Command::SetCounter(raw)])?;
                self.counter.set_logical(logical);
                info!(axis = %self.id, logical, raw, "counter synchronised");
                if self.tracking_enabled() {
                    self.start_tracking_now(now)?;
                }
                Ok(())
            }
            Deferred::Track => self.start_tracking_now(now),
            Deferred::Guide(GuideSelector::None) => self.release_guide(now),
            Deferred::Guide(selector) => self.engage_guide(selector, now),
        }
    }

    /// Stop tracking and guiding, kill a move. True when `cmd` was queued
    /// behind the position report that follows a kill.
    fn clear_for(&mut self, cmd: Deferred, now: Instant) -> Result<bool, AxisError> {
        self.stop_tracking_session(now)?;
        let was_guiding = self.guide.is_active();
        if was_guiding {
            self.guide.release();
        }
        if self.halt_motion(now)? {
            if was_guiding {
                self.send(&speed_block(self.base_speed()))?;
            }
            let expected = self.kill_position.take();
            self.send_query(expected, now)?;
            self.defer(cmd)?;
            return Ok(true);
        }
        Ok(false)
    }

    // ─── Moves ──────────────────────────────────────────────────────

    fn begin_move(&mut self, target: i64, parking: bool, now: Instant) -> Result<(), AxisError> {
        let start = self.counter.logical();
        let mut delta = target.saturating_sub(start);
        if !parking {
            if let Some(engine) = self.tracking.as_ref().filter(|t| t.enabled()) {
                delta = engine.compensate_slew(delta, self.profile.velocity);
            }
        }
        self.parking = parking;
        if delta == 0 {
            return self.finish_move(now);
        }

        let segment = self.motion.begin(start, delta, self.profile.velocity, now);
        if let Err(e) = self.send(&move_block(segment)) {
            self.motion.cancel();
            return Err(e.into());
        }
        self.pending = Pending::Segment;
        self.overdue_reported = false;
        info!(axis = %self.id, start, delta, parking, "move started");
        Ok(())
    }

    fn segment_done(&mut self, raw: u32, now: Instant) -> Result<(), AxisError> {
        let expected = self
            .motion
            .expected_logical()
            .unwrap_or_else(|| self.counter.logical());
        self.counter.resolve_near(raw, expected);
        self.overdue_reported = false;

        match self.motion.segment_complete(self.counter.logical(), now) {
            Some(next) => {
                if let Err(e) = self.send(&move_block(next)) {
                    self.motion.cancel();
                    self.pending = Pending::None;
                    return Err(e.into());
                }
                self.pending = Pending::Segment;
                Ok(())
            }
            None => {
                self.pending = Pending::None;
                self.finish_move(now)
            }
        }
    }

    /// End-of-move hook: a finished slew hands over to tracking.
    fn finish_move(&mut self, now: Instant) -> Result<(), AxisError> {
        let logical = self.counter.logical();
        if std::mem::take(&mut self.parking) {
            info!(axis = %self.id, logical, "parked");
        } else {
            info!(axis = %self.id, logical, "move finished");
            if self.tracking_enabled() {
                self.start_tracking_now(now)?;
            }
        }
        self.drain(now)
    }

    // ─── Tracking ───────────────────────────────────────────────────

    fn start_tracking_now(&mut self, now: Instant) -> Result<(), AxisError> {
        let (block, active) = match self.tracking.as_ref() {
            None => return Err(StateError::TrackingUnavailable.into()),
            Some(engine) => (
                worm_block(&self.profile, engine.worm(), engine.direction()),
                engine.is_active(),
            ),
        };
        if active {
            return Ok(());
        }
        if self.guide.is_active() {
            self.guide.remember_tracking();
            return Ok(());
        }
        if self.motion.is_moving() {
            return Err(StateError::MoveInFlight.into());
        }

        self.send(&block)?;
        if let Some(engine) = self.tracking.as_mut() {
            engine.start(&self.counter, now);
        }
        self.pending = Pending::Worm;
        info!(axis = %self.id, logical = self.counter.logical(), "tracking started");
        Ok(())
    }

    /// True if a worm was running.
    fn stop_tracking_session(&mut self, now: Instant) -> Result<bool, AxisError> {
        let Some(phase) = self.tracking.as_ref().and_then(|t| t.residual(now)) else {
            return Ok(false);
        };
        self.send(&[Command::ResetReference])?;
        self.transport.flush()?;
        self.reply.clear();
        self.send(&[Command::SetCounter(phase.raw)])?;
        self.send(&profile_frames(&self.profile))?;

        if let Some(engine) = self.tracking.as_mut() {
            engine.stop(now);
        }
        self.counter.set_logical(phase.logical);
        self.pending = Pending::None;
        info!(axis = %self.id, logical = phase.logical, raw = phase.raw, "tracking stopped");
        Ok(true)
    }

    // ─── Guiding ────────────────────────────────────────────────────

    fn engage_guide(&mut self, selector: GuideSelector, now: Instant) -> Result<(), AxisError> {
        if self.guide.selector() == selector {
            return Ok(());
        }
        let was_tracking = self.stop_tracking_session(now)?;

        if self.guide.is_active() || self.motion.is_moving() {
            // Reversal or interrupted move: re-read the position first.
            self.halt_motion(now)?;
            if self.guide.release() || was_tracking {
                self.guide.remember_tracking();
            }
            let expected = self.kill_position.take();
            self.send_query(expected, now)?;
            return self.defer(Deferred::Guide(selector));
        }

        let drift = self
            .tracking
            .as_ref()
            .filter(|t| t.enabled())
            .map(TrackingEngine::direction);
        let speed = self.guide.speed_profile(selector, drift);
        self.send(&speed_block(speed))?;

        let start = self.counter.logical();
        let delta = selector.direction().sign() * GUIDE_RUN_SENTINEL;
        let segment = self.motion.begin(start, delta, speed.velocity, now);
        if let Err(e) = self.send(&move_block(segment)) {
            self.motion.cancel();
            return Err(e.into());
        }
        self.guide.engage(selector, was_tracking);
        self.pending = Pending::Segment;
        info!(axis = %self.id, ?selector, velocity = speed.velocity, "guiding");
        Ok(())
    }

    fn release_guide(&mut self, now: Instant) -> Result<(), AxisError> {
        if !self.guide.is_active() {
            return Ok(());
        }
        self.halt_motion(now)?;
        self.send(&speed_block(self.base_speed()))?;
        let resume = self.guide.release();
        let expected = self.kill_position.take();
        self.send_query(expected, now)?;
        info!(axis = %self.id, resume, "guiding released");
        if resume {
            self.defer(Deferred::Track)?;
        }
        Ok(())
    }

    // ─── Event loop ─────────────────────────────────────────────────

    /// Consume a position report (or unsolicited noise).
    pub fn on_readable(&mut self, now: Instant) -> Result<(), AxisError> {
        if self.stopping {
            return Ok(());
        }
        if self.pending == Pending::None {
            let len = self.transport.bytes_available()?;
            self.transport.flush()?;
            if len == 0 {
                return Ok(());
            }
            warn!(axis = %self.id, len, "unsolicited bytes discarded");
            return Err(ProtocolError::Unsolicited { len }.into());
        }

        let mut buf = [0u8; POSITION_REPLY_LEN];
        loop {
            let want = self.reply.remaining();
            match self.transport.receive(&mut buf[..want], self.inter_byte_timeout) {
                Ok(0) | Err(TransportError::Timeout(_)) => {
                    if self.reply.is_empty() {
                        return Ok(());
                    }
                    return self.recover_short_reply(now);
                }
                Ok(n) => {
                    trace!(axis = %self.id, bytes = ?&buf[..n], "reply");
                    if let Some(raw) = self.reply.extend(&buf[..n]) {
                        return self.handle_sample(raw, now);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn recover_short_reply(&mut self, now: Instant) -> Result<(), AxisError> {
        let err = self.reply.abandon();
        warn!(axis = %self.id, error = %err, "discarding partial reply");
        self.transport.flush()?;
        match self.pending {
            Pending::Query { expected } => self.send_query(expected, now)?,
            Pending::Segment | Pending::SegmentCheck => self.check_segment(now)?,
            Pending::Worm | Pending::None => {}
        }
        Err(err.into())
    }

    /// Ask where the segment in flight ended; the report completes it.
    fn check_segment(&mut self, now: Instant) -> Result<(), AxisError> {
        self.send(&query_block())?;
        self.pending = Pending::SegmentCheck;
        self.last_query = Some(now);
        debug!(axis = %self.id, expected = ?self.motion.expected_logical(), "segment check");
        Ok(())
    }

    fn handle_sample(&mut self, raw: u32, now: Instant) -> Result<(), AxisError> {
        match self.pending {
            Pending::Query { expected } => {
                match expected {
                    Some(expected) => self.counter.resolve_near(raw, expected),
                    None => self.counter.update(raw, Direction::Stationary),
                }
                debug!(axis = %self.id, raw, logical = self.counter.logical(), "position");
                self.pending = Pending::None;
                self.drain(now)
            }
            Pending::Segment => self.segment_done(raw, now),
            Pending::SegmentCheck => {
                // A late completion report may follow the query reply.
                self.transport.flush()?;
                self.segment_done(raw, now)
            }
            Pending::Worm => {
                let direction = self
                    .tracking
                    .as_ref()
                    .map_or(Direction::Stationary, TrackingEngine::direction);
                self.counter.update(raw, direction);
                debug!(axis = %self.id, raw, logical = self.counter.logical(), "worm report");
                // Only the newest report matters.
                self.transport.flush()?;
                Ok(())
            }
            Pending::None => Ok(()),
        }
    }

    /// Time-driven work: overdue segments and periodic position reads.
    ///
    /// A segment without a completion report past its expected end is
    /// checked with a position query, repeated every inter-byte timeout
    /// until a report arrives.
    pub fn tick(&mut self, now: Instant) -> Result<(), AxisError> {
        if !self.stopping && self.motion.overdue(now, self.inter_byte_timeout) {
            if !self.overdue_reported {
                self.overdue_reported = true;
                warn!(
                    axis = %self.id,
                    in_flight = self.motion.in_flight(),
                    "no completion report past the expected end of the move"
                );
            }
            let unanswered = self
                .last_query
                .is_none_or(|at| now.saturating_duration_since(at) >= self.inter_byte_timeout);
            let recheck = match self.pending {
                Pending::Segment => true,
                Pending::SegmentCheck => unanswered,
                _ => false,
            };
            if recheck {
                self.reply.clear();
                self.check_segment(now)?;
            }
            return Ok(());
        }
        let quiet = !self.stopping && self.pending == Pending::None && self.deferred.is_empty();
        let stale = self
            .last_query
            .is_none_or(|at| now.saturating_duration_since(at) >= self.info_interval);
        if quiet && stale {
            self.send_query(None, now)?;
        }
        Ok(())
    }
}

impl<T: Transport> Axis for AxisController<T> {
    fn id(&self) -> AxisId {
        self.id
    }

    fn mode(&self) -> AxisMode {
        AxisController::mode(self)
    }

    fn info(&self, now: Instant) -> AxisInfo {
        AxisController::info(self, now)
    }

    fn wants_read(&self) -> bool {
        AxisController::wants_read(self)
    }

    fn poll_fd(&self) -> Option<RawFd> {
        AxisController::poll_fd(self)
    }

    fn readable(&mut self) -> Result<bool, AxisError> {
        Ok(self.transport.bytes_available()? > 0)
    }

    fn on_readable(&mut self, now: Instant) -> Result<(), AxisError> {
        AxisController::on_readable(self, now)
    }

    fn tick(&mut self, now: Instant) -> Result<(), AxisError> {
        AxisController::tick(self, now)
    }

    fn stop(&mut self, now: Instant) -> Result<(), AxisError> {
        AxisController::stop(self, now)
    }
}
