//! Loading `mount.toml` from disk.

use std::io::Write;
use tempfile::NamedTempFile;
use teld_common::config::Validate;
use teld_common::prelude::*;

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL: &str = r#"
poll_interval_ms = 50
info_interval_ms = 500
transport = "simulation"
guiding_speed = 0.25
guide_speed_offset = 6
tracking = true

[shared]
log_level = "debug"
service_name = "teld-trencin"

[ra]
name = "RA"
counts_per_degree = -56889.0
zero_deg = 0.0

[ra.profile]
velocity = 1200
start_speed = 150

[ra.worm]
backlash = 30

[dec]
name = "DEC"
counts_per_degree = -110222.0
zero_deg = 90.0
"#;

#[test]
fn test_load_full_config() {
    let file = write_config(FULL);
    let config = MountConfig::load_validated(file.path()).unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.transport, "simulation");
    assert_eq!(config.guide_speed_offset, 6);
    assert!(config.tracking);

    assert_eq!(config.ra.profile.velocity, 1200);
    assert_eq!(config.ra.profile.start_speed, 150);
    assert_eq!(config.ra.profile.acceleration, 800);
    let worm = config.ra.worm.unwrap();
    assert_eq!(worm.backlash, 30);
    assert_eq!(worm.wait, 101);

    assert_eq!(config.axis(AxisId::Dec).zero_deg, 90.0);
    assert_eq!(config.dec.kill_ack_timeout_ms, 10_000);
}

#[test]
fn test_missing_axis_is_parse_error() {
    let file = write_config(
        r#"
        [shared]
        service_name = "teld"
        [ra]
        name = "RA"
        counts_per_degree = 1.0
        "#,
    );
    assert!(matches!(
        MountConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_invalid_profile_fails_validation() {
    let file = write_config(&FULL.replace("start_speed = 150", "start_speed = 5000"));
    let config = MountConfig::load(file.path()).unwrap();
    assert!(config.validate().is_err());
    assert!(matches!(
        MountConfig::load_validated(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}
