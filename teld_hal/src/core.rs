//! Mount core: configuration, transports and the event loop.
//!
//! `MountCore` opens one transport per axis through the driver registry,
//! builds the [`Mount`], and runs a single-threaded readiness loop: poll
//! the handles of axes waiting for a reply, dispatch readable ones, then
//! give every axis its timed work. Nothing in the loop blocks longer than
//! the poll timeout or an inter-byte timeout.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{BorrowedFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use teld_common::config::{ConfigLoader, Validate};
use teld_common::hal::config::MountConfig;
use teld_common::hal::driver::{Axis, MountError, Transport};
use teld_common::hal::types::AxisId;
use tracing::{debug, error, info, warn};

use crate::driver_registry::DriverRegistry;
use crate::drivers::trencin::Mount;
use crate::model::AxisScaleModel;

/// Poll timeout used while some axis has no readiness handle.
const FDLESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Mount with runtime-selected transports.
pub type DynMount = Mount<Box<dyn Transport>>;

/// Event loop statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopStats {
    pub iterations: u64,
    pub dispatches: u64,
    pub protocol_errors: u64,
}

pub struct MountCore {
    config: MountConfig,
    registry: DriverRegistry,
    mount: Option<DynMount>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    stats: LoopStats,
}

impl MountCore {
    /// # Errors
    /// Returns `MountError::Config` if validation fails.
    pub fn new(config: MountConfig, registry: DriverRegistry) -> Result<Self, MountError> {
        config.validate()?;
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        info!(
            service = %config.shared.service_name,
            transport = %config.transport,
            "MountCore created"
        );
        Ok(Self {
            config,
            registry,
            mount: None,
            running: Arc::new(AtomicBool::new(false)),
            poll_interval,
            stats: LoopStats::default(),
        })
    }

    /// Load and validate `mount.toml`.
    pub fn load_config(path: &Path) -> Result<MountConfig, MountError> {
        info!("Loading configuration from {:?}", path);
        Ok(MountConfig::load_validated(path)?)
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Use `driver` instead of the configured transport.
    pub fn override_transport(&mut self, driver: &str) {
        self.config.transport = driver.to_string();
    }

    /// Open transports, build the mount and initialise both controllers.
    pub fn init(&mut self) -> Result<(), MountError> {
        let driver = self.config.transport.clone();
        info!("Initializing MountCore with transport '{}'...", driver);

        let ra = self
            .registry
            .create_transport(&driver, AxisId::Ra, &self.config.ra)?;
        let dec = self
            .registry
            .create_transport(&driver, AxisId::Dec, &self.config.dec)?;
        let model = Box::new(AxisScaleModel::new(&self.config));
        let mut mount = Mount::new(&self.config, ra, dec, model);
        mount.init(Instant::now())?;

        self.mount = Some(mount);
        info!("MountCore initialized successfully");
        Ok(())
    }

    pub fn mount(&self) -> Option<&DynMount> {
        self.mount.as_ref()
    }

    pub fn mount_mut(&mut self) -> Option<&mut DynMount> {
        self.mount.as_mut()
    }

    fn mount_or_err(&mut self) -> Result<&mut DynMount, MountError> {
        self.mount
            .as_mut()
            .ok_or_else(|| MountError::InitFailed("mount not initialized".to_string()))
    }

    /// Run until the running flag is cleared.
    pub fn run(&mut self) -> Result<(), MountError> {
        info!(
            "Starting MountCore event loop (poll_interval={}ms)...",
            self.poll_interval.as_millis()
        );
        self.running.store(true, Ordering::SeqCst);

        let mut last_report = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            self.run_once()?;

            let now = Instant::now();
            if now.duration_since(last_report) >= Duration::from_secs(60) {
                last_report = now;
                if let Some(mount) = self.mount.as_ref() {
                    match serde_json::to_string(&mount.info(now)) {
                        Ok(status) => debug!(
                            iterations = self.stats.iterations,
                            protocol_errors = self.stats.protocol_errors,
                            %status,
                            "status"
                        ),
                        Err(e) => warn!("Failed to serialize mount status: {}", e),
                    }
                }
            }
        }

        info!(
            "MountCore event loop stopped after {} iterations (protocol errors: {})",
            self.stats.iterations, self.stats.protocol_errors
        );
        Ok(())
    }

    /// One loop iteration: wait for readiness, dispatch, tick.
    pub fn run_once(&mut self) -> Result<(), MountError> {
        let poll_interval = self.poll_interval;
        let mount = self.mount_or_err()?;

        let mut handles: Vec<(AxisId, RawFd)> = Vec::with_capacity(2);
        let mut fdless: Vec<AxisId> = Vec::new();
        for axis in mount.axes() {
            if !axis.wants_read() {
                continue;
            }
            match axis.poll_fd() {
                Some(fd) => handles.push((axis.id(), fd)),
                None => fdless.push(axis.id()),
            }
        }

        let timeout = if fdless.is_empty() {
            poll_interval
        } else {
            FDLESS_POLL_INTERVAL.min(poll_interval)
        };
        let mut ready = wait_readable(&handles, timeout)?;

        for id in fdless {
            let readable = Axis::readable(mount.axis_mut(id)).map_err(MountError::axis(id))?;
            if readable {
                ready.push(id);
            }
        }

        let now = Instant::now();
        for id in ready {
            self.stats.dispatches += 1;
            let result = self.mount_or_err()?.on_readable(id, now);
            self.absorb(result)?;
        }
        let result = self.mount_or_err()?.tick(now);
        self.absorb(result)?;

        self.stats.iterations += 1;
        Ok(())
    }

    /// Protocol hiccups are logged and counted; everything else escalates.
    fn absorb(&mut self, result: Result<(), MountError>) -> Result<(), MountError> {
        match result {
            Err(MountError::Axis { axis, source }) if source.is_retryable() => {
                self.stats.protocol_errors += 1;
                warn!(%axis, error = %source, "protocol error, retrying on next poll");
                Ok(())
            }
            Err(e) => {
                error!("Hardware fault: {}", e);
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Stop the loop and bring both axes to rest.
    pub fn shutdown(&mut self) -> Result<(), MountError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        if let Some(mount) = self.mount.as_mut() {
            mount.shutdown(Instant::now())?;
        }
        Ok(())
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }
}

/// Block up to `timeout` for any of `handles` to become readable.
fn wait_readable(handles: &[(AxisId, RawFd)], timeout: Duration) -> Result<Vec<AxisId>, MountError> {
    // SAFETY: every fd belongs to a transport owned by the mount, which
    // outlives this call; the borrowed handles are dropped before returning.
    let mut fds: Vec<PollFd> = handles
        .iter()
        .map(|&(_, fd)| PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN))
        .collect();

    let millis = u16::try_from(timeout.as_millis()).map_or(PollTimeout::MAX, PollTimeout::from);
    match poll(&mut fds, millis) {
        Ok(_) => {}
        Err(Errno::EINTR) => return Ok(Vec::new()),
        Err(e) => return Err(MountError::InitFailed(format!("poll failed: {e}"))),
    }

    Ok(handles
        .iter()
        .zip(&fds)
        .filter(|(_, pfd)| {
            pfd.revents()
                .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP))
        })
        .map(|(&(id, _), _)| id)
        .collect())
}
