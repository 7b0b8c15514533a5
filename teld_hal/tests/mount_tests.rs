//! Two-axis mount operations over scripted lines.

use std::time::{Duration, Instant};
use teld_common::config::ConfigLoader;
use teld_common::prelude::*;
use teld_hal::drivers::simulation::ScriptedTransport;
use teld_hal::drivers::trencin::Mount;
use teld_hal::model::AxisScaleModel;

const QUERY: &str = "[\rU1\rU2\rU3\r]\r";

const CONFIG: &str = r#"
transport = "simulation"

[shared]
service_name = "teld-test"

[ra]
name = "RA"
counts_per_degree = -56889.0

[ra.worm]

[dec]
name = "DEC"
counts_per_degree = -110222.0
zero_deg = 90.0
"#;

fn ready(now: Instant) -> Mount<ScriptedTransport> {
    let config = MountConfig::parse(CONFIG).unwrap();
    let model = Box::new(AxisScaleModel::new(&config));
    let mut mount = Mount::new(
        &config,
        ScriptedTransport::acknowledging(),
        ScriptedTransport::acknowledging(),
        model,
    );
    mount.init(now).unwrap();
    for id in AxisId::ALL {
        mount.axis_mut(id).transport_mut().push_position(0);
        mount.on_readable(id, now).unwrap();
        mount.axis_mut(id).transport_mut().take_sent();
    }
    mount
}

fn sent(mount: &mut Mount<ScriptedTransport>, id: AxisId) -> String {
    mount.axis_mut(id).transport_mut().take_sent()
}

#[test]
fn test_resync_requires_target() {
    let t0 = Instant::now();
    let mut mount = ready(t0);

    let err = mount.start_resync(t0).unwrap_err();
    assert!(matches!(err, MountError::NoTarget));
}

#[test]
fn test_resync_moves_both_axes_to_target() {
    let t0 = Instant::now();
    let mut mount = ready(t0);

    mount.set_target(1.0, 89.0);
    mount.start_resync(t0).unwrap();

    assert_eq!(sent(&mut mount, AxisId::Ra), "[\rB56889\rr\rU1\rU2\rU3\r]\r");
    assert_eq!(sent(&mut mount, AxisId::Dec), "[\rF110222\rr\rU1\rU2\rU3\r]\r");
    assert!(mount.is_moving());
    assert_eq!(mount.info(t0).mode, AxisMode::Moving);
}

#[test]
fn test_info_reports_sky_position() {
    let t0 = Instant::now();
    let mut mount = ready(t0);

    mount.set_to(2.0, 80.0, t0).unwrap();
    let ra_counts = (2.0f64 * -56889.0).round() as i64;
    assert_eq!(
        sent(&mut mount, AxisId::Ra),
        format!("={}\r", ra_counts.rem_euclid(teld_common::consts::MAX_MOVE))
    );

    let info = mount.info(t0);
    assert_eq!(info.logical_ra, ra_counts);
    assert_eq!(info.logical_dec, 1_102_220);
    assert!((info.ra - 2.0).abs() < 1e-9);
    assert!((info.dec - 80.0).abs() < 1e-9);
    assert_eq!(info.mode, AxisMode::Idle);
}

#[test]
fn test_guide_on_one_axis_leaves_the_other_alone() {
    let t0 = Instant::now();
    let mut mount = ready(t0);

    mount.set_guide_rate(AxisId::Dec, GuideSelector::Plus, t0).unwrap();

    assert!(sent(&mut mount, AxisId::Dec).starts_with("[\rA800\rs200\rV861\r]\r"));
    assert_eq!(sent(&mut mount, AxisId::Ra), "");
    assert_eq!(mount.axis(AxisId::Ra).mode(), AxisMode::Idle);
    assert_eq!(mount.axis(AxisId::Dec).mode(), AxisMode::Guiding);
    assert_eq!(mount.info(t0).mode, AxisMode::Guiding);
}

#[test]
fn test_stop_move_kills_both_axes() {
    let t0 = Instant::now();
    let mut mount = ready(t0);
    mount.set_target(1.0, 89.0);
    mount.start_resync(t0).unwrap();
    sent(&mut mount, AxisId::Ra);
    sent(&mut mount, AxisId::Dec);

    mount.stop_move(t0 + Duration::from_millis(100)).unwrap();

    for id in AxisId::ALL {
        assert_eq!(sent(&mut mount, id), format!("K\r{QUERY}"));
        assert_eq!(mount.axis(id).mode(), AxisMode::Idle);
    }
    assert!(!mount.is_moving());
}

#[test]
fn test_tracking_is_an_ra_operation() {
    let t0 = Instant::now();
    let mut mount = ready(t0);

    mount.set_tracking_enabled(true, t0).unwrap();
    assert_eq!(mount.axis(AxisId::Ra).mode(), AxisMode::Tracking);
    assert_eq!(mount.axis(AxisId::Dec).mode(), AxisMode::Idle);
    assert_eq!(sent(&mut mount, AxisId::Dec), "");
}

#[test]
fn test_guiding_speed_restarts_active_guide() {
    let t0 = Instant::now();
    let mut mount = ready(t0);
    mount.set_guide_rate(AxisId::Ra, GuideSelector::Minus, t0).unwrap();
    sent(&mut mount, AxisId::Ra);

    mount.set_guiding_speed(0.25, t0).unwrap();
    assert_eq!(sent(&mut mount, AxisId::Ra), format!("K\r{QUERY}"));
    assert_eq!(sent(&mut mount, AxisId::Dec), "");

    mount.axis_mut(AxisId::Ra).transport_mut().push_position(0);
    mount.on_readable(AxisId::Ra, t0).unwrap();
    assert!(sent(&mut mount, AxisId::Ra).starts_with("[\rA800\rs200\rV222\r]\r[\rB"));
    assert_eq!(mount.axis(AxisId::Ra).guide().selector(), GuideSelector::Minus);
}

#[test]
fn test_axis_errors_name_the_axis() {
    let t0 = Instant::now();
    let mut mount = ready(t0);
    mount.axis_mut(AxisId::Dec).transport_mut().set_fail_writes(true);

    let err = mount
        .set_guide_rate(AxisId::Dec, GuideSelector::Plus, t0)
        .unwrap_err();
    assert!(matches!(
        err,
        MountError::Axis {
            axis: AxisId::Dec,
            source: AxisError::Transport(TransportError::Write(_)),
        }
    ));
    assert!(err.to_string().starts_with("DEC axis: "));
}

#[test]
fn test_park_returns_both_axes_to_zero() {
    let t0 = Instant::now();
    let mut mount = ready(t0);
    mount.set_to(1.0, 89.0, t0).unwrap();
    mount.set_tracking_enabled(true, t0).unwrap();
    sent(&mut mount, AxisId::Ra);
    sent(&mut mount, AxisId::Dec);

    mount.start_park(t0).unwrap();
    assert!(mount.is_parking());
    let ra = sent(&mut mount, AxisId::Ra);
    assert!(ra.ends_with("[\rF56889\rr\rU1\rU2\rU3\r]\r"), "{ra:?}");
    assert_eq!(sent(&mut mount, AxisId::Dec), "[\rB110222\rr\rU1\rU2\rU3\r]\r");

    let t1 = t0 + Duration::from_secs(3);
    mount.axis_mut(AxisId::Ra).transport_mut().push_position(0);
    mount.on_readable(AxisId::Ra, t1).unwrap();
    // Parking never hands over to tracking.
    assert_eq!(mount.axis(AxisId::Ra).counter().logical(), 0);
    assert_eq!(mount.axis(AxisId::Ra).mode(), AxisMode::Idle);
    assert_eq!(sent(&mut mount, AxisId::Ra), "");
}
