//! Mount configuration types.
//!
//! - `MountConfig` - Main configuration loaded from `mount.toml`
//! - `AxisConfig` - Per-axis serial line, calibration and motor profile
//! - `MotorProfile` / `WormProfile` - Parameters programmed into the controller

use crate::config::{ConfigError, SharedConfig, Validate};
use crate::consts::{DEFAULT_GUIDE_SPEED_OFFSET, MAX_START_SPEED};
use crate::hal::types::AxisId;
use serde::{Deserialize, Serialize};

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_info_interval_ms() -> u64 {
    1000
}

fn default_transport() -> String {
    "serial".to_string()
}

fn default_guiding_speed() -> f64 {
    0.5
}

fn default_guide_speed_offset() -> u32 {
    DEFAULT_GUIDE_SPEED_OFFSET
}

fn default_baud() -> u32 {
    4800
}

/// VTIME 40 on the controller line (deciseconds).
fn default_inter_byte_timeout_ms() -> u64 {
    4000
}

fn default_kill_ack_timeout_ms() -> u64 {
    10_000
}

/// Main configuration loaded from `mount.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Logging and identity.
    pub shared: SharedConfig,

    /// Event loop poll timeout in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often idle axes are re-queried for their position.
    #[serde(default = "default_info_interval_ms")]
    pub info_interval_ms: u64,

    /// Transport driver name (`"serial"` or `"simulation"`).
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Guiding speed in degrees per second.
    #[serde(default = "default_guiding_speed")]
    pub guiding_speed: f64,

    /// Velocity adjustment applied to the tracking axis while guiding.
    #[serde(default = "default_guide_speed_offset")]
    pub guide_speed_offset: u32,

    /// Start sidereal tracking after every completed move.
    #[serde(default)]
    pub tracking: bool,

    /// Hour angle / right ascension axis.
    pub ra: AxisConfig,

    /// Declination axis.
    pub dec: AxisConfig,
}

impl MountConfig {
    /// Configuration of one axis.
    pub fn axis(&self, axis: AxisId) -> &AxisConfig {
        match axis {
            AxisId::Ra => &self.ra,
            AxisId::Dec => &self.dec,
        }
    }
}

impl Validate for MountConfig {
    /// # Validation Rules
    /// 1. `shared` is valid
    /// 2. `poll_interval_ms` and `info_interval_ms` > 0
    /// 3. `guiding_speed` is finite and > 0
    /// 4. both axes are valid
    /// 5. the serial transport has a device on every axis
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.poll_interval_ms == 0 || self.info_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms and info_interval_ms must be greater than 0".to_string(),
            ));
        }

        if !self.guiding_speed.is_finite() || self.guiding_speed <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "guiding_speed must be positive, got {}",
                self.guiding_speed
            )));
        }

        for axis in AxisId::ALL {
            let cfg = self.axis(axis);
            cfg.validate()?;
            if self.transport == "serial" && cfg.device.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Axis '{}': serial transport requires a device",
                    cfg.name
                )));
            }
        }

        Ok(())
    }
}

/// Per-axis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Display name (e.g. "RA", "DEC").
    pub name: String,

    /// Serial device path.
    #[serde(default)]
    pub device: String,

    /// Line speed.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Inter-character timeout for replies.
    #[serde(default = "default_inter_byte_timeout_ms")]
    pub inter_byte_timeout_ms: u64,

    /// Timeout for the single-byte kill acknowledgment.
    #[serde(default = "default_kill_ack_timeout_ms")]
    pub kill_ack_timeout_ms: u64,

    /// Hardware steps per degree (signed; the sign encodes gearing direction).
    pub counts_per_degree: f64,

    /// Axis angle in degrees at logical position 0.
    #[serde(default)]
    pub zero_deg: f64,

    /// Base motor profile.
    #[serde(default)]
    pub profile: MotorProfile,

    /// Worm (sidereal tracking) profile. Only the tracking axis has one.
    #[serde(default)]
    pub worm: Option<WormProfile>,
}

impl AxisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "Axis name cannot be empty".to_string(),
            ));
        }
        if !self.counts_per_degree.is_finite() || self.counts_per_degree == 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Axis '{}': counts_per_degree must be non-zero",
                self.name
            )));
        }
        if self.baud == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Axis '{}': baud must be greater than 0",
                self.name
            )));
        }
        self.profile
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("Axis '{}': {}", self.name, e)))?;
        if let Some(worm) = &self.worm {
            if worm.velocity == 0 || worm.loops == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Axis '{}': worm velocity and loops must be greater than 0",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Base motor profile programmed at initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorProfile {
    /// Top velocity (`V`), in units of 64 steps/s.
    pub velocity: u32,
    /// Acceleration (`A`).
    pub acceleration: u32,
    /// Start/stop speed (`s`).
    pub start_speed: u32,
    /// Microstep divisor (`M`).
    pub microstep: u32,
    /// Steps-per-cycle shape count (`N`).
    pub shape: u32,
    /// Microsteps in top speed (`q`).
    pub qualification: u32,
}

impl Default for MotorProfile {
    fn default() -> Self {
        Self {
            velocity: 1500,
            acceleration: 800,
            start_speed: MAX_START_SPEED,
            microstep: 8,
            shape: 6,
            qualification: 2,
        }
    }
}

impl MotorProfile {
    pub fn validate(&self) -> Result<(), String> {
        if self.velocity == 0 {
            return Err("velocity must be greater than 0".to_string());
        }
        if self.start_speed > self.velocity {
            return Err(format!(
                "start_speed {} exceeds velocity {}",
                self.start_speed, self.velocity
            ));
        }
        Ok(())
    }
}

/// Worm program parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WormProfile {
    pub acceleration: u32,
    pub velocity: u32,
    /// Step size of the worm program (`F`/`B`).
    pub backlash: u32,
    /// Pause after each step (`W`), in milliseconds.
    pub wait: u32,
    /// Steps between position reports (`L`).
    pub loops: u32,
}

impl Default for WormProfile {
    fn default() -> Self {
        Self {
            acceleration: 100,
            velocity: 200,
            backlash: 24,
            wait: 101,
            loops: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    const MINIMAL: &str = r#"
        [shared]
        service_name = "teld"

        [ra]
        name = "RA"
        device = "/dev/ttyS0"
        counts_per_degree = -56889.0
        [ra.worm]

        [dec]
        name = "DEC"
        device = "/dev/ttyS1"
        counts_per_degree = -110222.0
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = MountConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.transport, "serial");
        assert_eq!(config.guide_speed_offset, 4);
        assert_eq!(config.ra.baud, 4800);
        assert_eq!(config.ra.profile, MotorProfile::default());
        assert_eq!(config.ra.worm, Some(WormProfile::default()));
        assert!(config.dec.worm.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_start_speed_above_velocity_rejected() {
        let mut config = MountConfig::parse(MINIMAL).unwrap();
        config.dec.profile.start_speed = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_serial_requires_device() {
        let mut config = MountConfig::parse(MINIMAL).unwrap();
        config.ra.device.clear();
        assert!(config.validate().is_err());

        config.transport = "simulation".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_counts_per_degree_rejected() {
        let mut config = MountConfig::parse(MINIMAL).unwrap();
        config.ra.counts_per_degree = 0.0;
        assert!(config.validate().is_err());
    }
}
