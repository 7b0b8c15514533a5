//! Two-axis mount built from two [`AxisController`]s.
//!
//! Sky coordinates go through the [`CoordinateModel`]; everything below is
//! counts. Operations that touch both axes run the send phase of a kill on
//! every affected axis before waiting for any acknowledgment.

use std::time::{Duration, Instant};
use teld_common::hal::config::MountConfig;
use teld_common::hal::driver::{Axis, AxisError, CoordinateModel, MountError, Transport};
use teld_common::hal::types::{AxisId, AxisMode, GuideSelector, MountInfo};
use tracing::info;

use super::axis::{AxisController, KillPhases};

pub struct Mount<T: Transport> {
    ra: AxisController<T>,
    dec: AxisController<T>,
    model: Box<dyn CoordinateModel>,
    target: Option<(f64, f64)>,
    guiding_speed: f64,
    track_on_start: bool,
}

impl<T: Transport> Mount<T> {
    pub fn new(config: &MountConfig, ra: T, dec: T, model: Box<dyn CoordinateModel>) -> Self {
        let info_interval = Duration::from_millis(config.info_interval_ms);
        let build = |id: AxisId, transport: T| {
            AxisController::new(id, config.axis(id), transport)
                .with_guide(config.guiding_speed, config.guide_speed_offset)
                .with_info_interval(info_interval)
        };
        Self {
            ra: build(AxisId::Ra, ra),
            dec: build(AxisId::Dec, dec),
            model,
            target: None,
            guiding_speed: config.guiding_speed,
            track_on_start: config.tracking,
        }
    }

    pub fn axis(&self, id: AxisId) -> &AxisController<T> {
        match id {
            AxisId::Ra => &self.ra,
            AxisId::Dec => &self.dec,
        }
    }

    pub fn axis_mut(&mut self, id: AxisId) -> &mut AxisController<T> {
        match id {
            AxisId::Ra => &mut self.ra,
            AxisId::Dec => &mut self.dec,
        }
    }

    /// Both axes as the event loop sees them.
    pub fn axes(&self) -> [&dyn Axis; 2] {
        [&self.ra, &self.dec]
    }

    fn axis_dyn_mut(&mut self, id: AxisId) -> &mut dyn Axis {
        self.axis_mut(id)
    }

    /// Run `op` on one axis, tagging errors with the axis.
    fn on_axis<R>(
        &mut self,
        id: AxisId,
        op: impl FnOnce(&mut AxisController<T>) -> Result<R, AxisError>,
    ) -> Result<R, MountError> {
        op(self.axis_mut(id)).map_err(MountError::axis(id))
    }

    pub fn init(&mut self, now: Instant) -> Result<(), MountError> {
        for id in AxisId::ALL {
            self.on_axis(id, |axis| axis.init(now))?;
        }
        if self.track_on_start {
            self.set_tracking_enabled(true, now)?;
        }
        info!(guiding_speed = self.guiding_speed, "mount initialised");
        Ok(())
    }

    pub fn info(&self, now: Instant) -> MountInfo {
        let ra = self.ra.info(now);
        let dec = self.dec.info(now);
        let (ra_deg, dec_deg) = self.model.counts_to_sky(ra.logical, dec.logical);
        MountInfo {
            mode: ra.mode.dominant(dec.mode),
            logical_ra: ra.logical,
            logical_dec: dec.logical,
            ra: ra_deg,
            dec: dec_deg,
            axes: [ra, dec],
        }
    }

    pub fn set_target(&mut self, ra: f64, dec: f64) {
        info!(ra, dec, "target set");
        self.target = Some((ra, dec));
    }

    pub fn target(&self) -> Option<(f64, f64)> {
        self.target
    }

    /// Slew both axes to the current target.
    pub fn start_resync(&mut self, now: Instant) -> Result<(), MountError> {
        let (ra, dec) = self.target.ok_or(MountError::NoTarget)?;
        let (ra_counts, dec_counts) = self.model.sky_to_counts(ra, dec);
        info!(ra, dec, ra_counts, dec_counts, "slewing");
        self.on_axis(AxisId::Ra, |axis| axis.move_to(ra_counts, now))?;
        self.on_axis(AxisId::Dec, |axis| axis.move_to(dec_counts, now))
    }

    fn in_motion(&self, id: AxisId) -> bool {
        matches!(self.axis(id).mode(), AxisMode::Moving | AxisMode::Guiding)
    }

    /// Stop both axes: kill both, then collect both acknowledgments.
    pub fn stop_move(&mut self, now: Instant) -> Result<(), MountError> {
        for id in AxisId::ALL {
            if self.in_motion(id) {
                self.on_axis(id, |axis| axis.kill(KillPhases::SEND, now))?;
            }
        }
        for id in AxisId::ALL {
            self.on_axis(id, |axis| axis.stop(now))?;
        }
        Ok(())
    }

    pub fn set_guide_rate(
        &mut self,
        id: AxisId,
        selector: GuideSelector,
        now: Instant,
    ) -> Result<(), MountError> {
        self.on_axis(id, |axis| axis.set_guide(selector, now))
    }

    /// Change the guiding speed; axes guiding right now restart at it.
    pub fn set_guiding_speed(&mut self, deg_per_sec: f64, now: Instant) -> Result<(), MountError> {
        self.guiding_speed = deg_per_sec;
        for id in AxisId::ALL {
            if self.axis(id).guide().is_active() {
                self.on_axis(id, |axis| axis.kill(KillPhases::SEND, now))?;
            }
        }
        for id in AxisId::ALL {
            self.on_axis(id, |axis| axis.set_guide_speed(deg_per_sec, now))?;
        }
        Ok(())
    }

    pub fn set_tracking_enabled(&mut self, enabled: bool, now: Instant) -> Result<(), MountError> {
        self.on_axis(AxisId::Ra, |axis| axis.set_tracking_enabled(enabled, now))
    }

    /// Declare the mount to be pointing at (`ra`, `dec`).
    pub fn set_to(&mut self, ra: f64, dec: f64, now: Instant) -> Result<(), MountError> {
        let (ra_counts, dec_counts) = self.model.sky_to_counts(ra, dec);
        info!(ra, dec, ra_counts, dec_counts, "synchronising");
        self.on_axis(AxisId::Ra, |axis| axis.sync(ra_counts, now))?;
        self.on_axis(AxisId::Dec, |axis| axis.sync(dec_counts, now))
    }

    pub fn start_park(&mut self, now: Instant) -> Result<(), MountError> {
        info!("parking");
        for id in AxisId::ALL {
            self.on_axis(id, |axis| axis.park(now))?;
        }
        Ok(())
    }

    pub fn reset(&mut self, now: Instant) -> Result<(), MountError> {
        for id in AxisId::ALL {
            self.on_axis(id, |axis| axis.reset(now))?;
        }
        Ok(())
    }

    pub fn is_moving(&self) -> bool {
        AxisId::ALL.into_iter().any(|id| {
            matches!(
                self.axis(id).mode(),
                AxisMode::Moving | AxisMode::Guiding | AxisMode::Stopping
            )
        })
    }

    /// Parking is a move to zero; it is over when the move is.
    pub fn is_parking(&self) -> bool {
        self.is_moving()
    }

    pub fn on_readable(&mut self, id: AxisId, now: Instant) -> Result<(), MountError> {
        self.axis_dyn_mut(id)
            .on_readable(now)
            .map_err(MountError::axis(id))
    }

    pub fn tick(&mut self, now: Instant) -> Result<(), MountError> {
        for id in AxisId::ALL {
            self.axis_dyn_mut(id).tick(now).map_err(MountError::axis(id))?;
        }
        Ok(())
    }

    /// Stop every axis on the way out.
    pub fn shutdown(&mut self, now: Instant) -> Result<(), MountError> {
        self.stop_move(now)
    }
}
