//! # Teld Mount Daemon
//!
//! Drives the RA and DEC axes of the mount through their serial stepper
//! controllers.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulated controllers
//! teld --config config/mount.toml --simulate
//!
//! # Slew to a target and start tracking
//! teld --target 123.5 -12.25 --track
//!
//! # Verbose JSON logging
//! teld -s -v --json
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;
use teld_common::config::LogLevel;
use teld_common::consts::DEFAULT_CONFIG_PATH;
use teld_hal::core::MountCore;
use teld_hal::driver_registry::DriverRegistry;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Teld - telescope mount axis daemon
#[derive(Parser, Debug)]
#[command(name = "teld")]
#[command(version)]
#[command(about = "Two-axis telescope mount control daemon")]
#[command(long_about = None)]
struct Args {
    /// Path to mount configuration file (mount.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated controllers instead of the configured transport
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Slew to RA/DEC (degrees) after initialization
    #[arg(long, num_args = 2, value_names = ["RA", "DEC"], allow_negative_numbers = true)]
    target: Option<Vec<f64>>,

    /// Enable sidereal tracking on RA
    #[arg(long)]
    track: bool,

    /// Park both axes at their zero position
    #[arg(long, conflicts_with = "target")]
    park: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("teld startup failed: {}", e);
        eprintln!("teld: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = MountCore::load_config(&args.config)?;
    setup_tracing(&args, config.shared.log_level);

    info!("Teld v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut core = MountCore::new(config, DriverRegistry::with_builtin())?;
    if args.simulate {
        info!("Simulation mode enabled");
        core.override_transport("simulation");
    }

    let running = core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    core.init()?;
    apply_startup_commands(&mut core, &args)?;

    if let Err(e) = core.run() {
        error!("Event loop error: {}", e);
    }

    core.shutdown()?;
    info!("Teld shutdown complete");
    Ok(())
}

/// Issue the one-shot commands given on the command line.
fn apply_startup_commands(
    core: &mut MountCore,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mount) = core.mount_mut() else {
        return Ok(());
    };
    let now = Instant::now();

    if args.track {
        mount.set_tracking_enabled(true, now)?;
    }
    if let Some([ra, dec]) = args.target.as_deref() {
        info!(ra, dec, "Slewing to target");
        mount.set_target(*ra, *dec);
        mount.start_resync(now)?;
    } else if args.park {
        info!("Parking");
        mount.start_park(now)?;
    }
    Ok(())
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        "debug"
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
