//! Linear axis-scale coordinate model.
//!
//! Maps each axis angle to counts with the calibration constant and the
//! angle at logical zero. Pointing corrections are out of scope here; a
//! richer model plugs in through `CoordinateModel`.

use teld_common::hal::config::MountConfig;
use teld_common::hal::driver::CoordinateModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScaleModel {
    ra_counts_per_degree: f64,
    ra_zero_deg: f64,
    dec_counts_per_degree: f64,
    dec_zero_deg: f64,
}

impl AxisScaleModel {
    pub fn new(config: &MountConfig) -> Self {
        Self {
            ra_counts_per_degree: config.ra.counts_per_degree,
            ra_zero_deg: config.ra.zero_deg,
            dec_counts_per_degree: config.dec.counts_per_degree,
            dec_zero_deg: config.dec.zero_deg,
        }
    }
}

impl CoordinateModel for AxisScaleModel {
    fn sky_to_counts(&self, ra: f64, dec: f64) -> (i64, i64) {
        (
            ((ra - self.ra_zero_deg) * self.ra_counts_per_degree).round() as i64,
            ((dec - self.dec_zero_deg) * self.dec_counts_per_degree).round() as i64,
        )
    }

    fn counts_to_sky(&self, ra_counts: i64, dec_counts: i64) -> (f64, f64) {
        (
            self.ra_zero_deg + ra_counts as f64 / self.ra_counts_per_degree,
            self.dec_zero_deg + dec_counts as f64 / self.dec_counts_per_degree,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> AxisScaleModel {
        AxisScaleModel {
            ra_counts_per_degree: -56889.0,
            ra_zero_deg: 0.0,
            dec_counts_per_degree: -110222.0,
            dec_zero_deg: 90.0,
        }
    }

    #[test]
    fn test_counts_from_angles() {
        assert_eq!(model().sky_to_counts(1.0, 89.0), (-56889, 110222));
    }

    #[test]
    fn test_angles_from_counts() {
        let (ra, dec) = model().counts_to_sky(-56889 * 2, 0);
        assert!((ra - 2.0).abs() < 1e-9);
        assert!((dec - 90.0).abs() < 1e-9);
    }
}
