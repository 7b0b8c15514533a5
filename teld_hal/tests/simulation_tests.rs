//! End-to-end runs against the simulated stepper controller.

use std::io::Write;
use std::time::Duration;
use teld_common::config::ConfigLoader;
use teld_common::prelude::*;
use teld_hal::core::MountCore;
use teld_hal::driver_registry::DriverRegistry;
use teld_hal::drivers::simulation::SimulatedController;
use teld_hal::drivers::trencin::AxisController;

const CONFIG: &str = r#"
transport = "simulation"
poll_interval_ms = 5

[shared]
service_name = "teld-sim"

[ra]
name = "RA"
counts_per_degree = -56889.0

[ra.worm]

[dec]
name = "DEC"
counts_per_degree = -110222.0
"#;

fn config() -> MountConfig {
    MountConfig::parse(CONFIG).unwrap()
}

fn sim_axis(id: AxisId) -> AxisController<SimulatedController> {
    let config = config();
    let axis_config = config.axis(id);
    let start = std::time::Instant::now();
    let sim = SimulatedController::with_manual_clock(axis_config.profile, start);
    AxisController::new(id, axis_config, sim)
}

fn advance(axis: &mut AxisController<SimulatedController>, dt: Duration) -> std::time::Instant {
    axis.transport_mut().advance(dt);
    axis.transport().now()
}

#[test]
fn test_init_programs_controller_and_reads_position() {
    let mut axis = sim_axis(AxisId::Dec);
    axis.transport_mut().set_position(1234);
    let now = axis.transport().now();

    axis.init(now).unwrap();
    assert_eq!(*axis.transport().registers(), MotorProfile::default());

    axis.on_readable(now).unwrap();
    assert_eq!(axis.counter().logical(), 1234);
    assert!(!axis.wants_read());
}

#[test]
fn test_move_completes_with_report() {
    let mut axis = sim_axis(AxisId::Dec);
    let t0 = axis.transport().now();
    axis.init(t0).unwrap();
    axis.on_readable(t0).unwrap();

    axis.start_move(96_000, t0).unwrap();
    assert!(axis.transport().is_running());

    let t1 = advance(&mut axis, Duration::from_millis(500));
    axis.on_readable(t1).unwrap();
    assert_eq!(axis.mode(), AxisMode::Moving);
    let midway = axis.info(t1).logical;
    assert!((midway - 48_000).abs() < 100, "midway = {midway}");

    let t2 = advance(&mut axis, Duration::from_millis(600));
    axis.on_readable(t2).unwrap();
    assert_eq!(axis.mode(), AxisMode::Idle);
    assert_eq!(axis.counter().logical(), 96_000);
}

#[test]
fn test_stop_mid_move_reads_back_position() {
    let mut axis = sim_axis(AxisId::Dec);
    let t0 = axis.transport().now();
    axis.init(t0).unwrap();
    axis.on_readable(t0).unwrap();

    axis.start_move(-96_000, t0).unwrap();
    let t1 = advance(&mut axis, Duration::from_millis(250));
    axis.stop(t1).unwrap();
    axis.on_readable(t1).unwrap();

    assert_eq!(axis.mode(), AxisMode::Idle);
    assert_eq!(axis.counter().logical(), -24_000);
    assert_eq!(axis.counter().cycle(), -1);
}

#[test]
fn test_worm_tracks_and_resyncs_on_stop() {
    let mut axis = sim_axis(AxisId::Ra);
    let t0 = axis.transport().now();
    axis.transport_mut().set_position(10_000);
    axis.init(t0).unwrap();
    axis.on_readable(t0).unwrap();

    axis.set_tracking_enabled(true, t0).unwrap();
    assert!(axis.transport().worm_running());
    // First report comes straight after the label.
    axis.on_readable(t0).unwrap();
    assert_eq!(axis.counter().logical(), 10_000);

    let t1 = advance(&mut axis, Duration::from_millis(1010));
    axis.on_readable(t1).unwrap();
    assert_eq!(axis.counter().logical(), 10_000 - 240);

    axis.stop_tracking(t1).unwrap();
    assert!(!axis.transport().worm_running());
    assert_eq!(axis.counter().logical(), 10_000 - 240);
    assert_eq!(axis.transport().position(), 10_000 - 240);
    assert_eq!(axis.transport().registers().velocity, 1500);
}

#[test]
fn test_event_loop_completes_slew() {
    let mut core = MountCore::new(config(), DriverRegistry::with_builtin()).unwrap();
    core.init().unwrap();
    core.run_once().unwrap();

    let mount = core.mount_mut().unwrap();
    assert_eq!(mount.info(std::time::Instant::now()).logical_ra, 0);
    mount.set_target(0.01, 0.01);
    mount.start_resync(std::time::Instant::now()).unwrap();

    for _ in 0..200 {
        core.run_once().unwrap();
        if core.mount().is_some_and(|m| !m.is_moving()) {
            break;
        }
    }

    let mount = core.mount().unwrap();
    assert!(!mount.is_moving());
    let info = mount.info(std::time::Instant::now());
    assert_eq!(info.logical_ra, -569);
    assert_eq!(info.logical_dec, -1102);
    assert!(core.stats().iterations > 1);

    core.shutdown().unwrap();
}

#[test]
fn test_core_rejects_unknown_transport() {
    let mut config = config();
    config.transport = "canbus".to_string();
    let mut core = MountCore::new(config, DriverRegistry::with_builtin()).unwrap();

    let err = core.init().unwrap_err();
    assert!(matches!(err, MountError::DriverNotFound(ref name) if name == "canbus"));
    assert!(core.run_once().is_err());
}

#[test]
fn test_core_loads_config_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file.flush().unwrap();

    let config = MountCore::load_config(file.path()).unwrap();
    assert_eq!(config.poll_interval_ms, 5);
    let core = MountCore::new(config, DriverRegistry::with_builtin()).unwrap();
    assert_eq!(core.config().transport, "simulation");
    assert!(core.mount().is_none());

    let missing = MountCore::load_config(std::path::Path::new("/nonexistent/mount.toml"));
    assert!(matches!(
        missing,
        Err(MountError::Config(ConfigError::FileNotFound))
    ));
}
