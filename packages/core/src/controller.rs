//! Top-level command sequencing.
//!
//! One controller instance owns a configuration snapshot and exposes the
//! four operator commands. Commands are straight-line sequences with no
//! retries; bring-up failures roll the host back to fully off, tear-down
//! is always best effort.

use std::path::PathBuf;
use std::time::Duration;

use log::error;

use crate::config::{FleetSpec, MOUNT_ROOT};
use crate::crypt::ensure_cryptsetup_version;
use crate::error::{Result, Warning};
use crate::fleet::{FleetOrchestrator, FleetOutcome};
use crate::identity::{ensure_root, IdentityResolver};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::supervisor::ServiceSupervisor;

/// Aggregated non-fatal diagnostics from a completed command.
#[derive(Debug, Default)]
pub struct CommandReport {
    pub warnings: Vec<Warning>,
}

pub struct SystemController<'a> {
    spec: &'a FleetSpec,
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
    identity: &'a dyn IdentityResolver,
    mount_root: PathBuf,
    device_wait: Option<(u32, Duration)>,
}

impl<'a> SystemController<'a> {
    pub fn new(
        spec: &'a FleetSpec,
        probe: &'a dyn Probe,
        runner: &'a dyn Runner,
        identity: &'a dyn IdentityResolver,
    ) -> Self {
        Self {
            spec,
            probe,
            runner,
            identity,
            mount_root: PathBuf::from(MOUNT_ROOT),
            device_wait: None,
        }
    }

    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }

    pub fn with_device_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.device_wait = Some((attempts, delay));
        self
    }

    /// Process-level preconditions, checked before any command runs.
    ///
    /// Root is required for every command; the cryptsetup gate only
    /// matters when at least one encrypted device is configured.
    pub fn preflight(&self) -> Result<()> {
        ensure_root()?;
        if self.spec.devices().any(|device| device.is_configured()) {
            let minimum = self
                .spec
                .min_cryptsetup_version
                .as_deref()
                .unwrap_or("0");
            ensure_cryptsetup_version(self.runner, minimum)?;
        }
        Ok(())
    }

    /// Stops services, brings up all storage, then starts services.
    ///
    /// Any fatal failure leaves the host in the fully-off state: storage
    /// failures are rolled back by the fleet orchestrator, and a service
    /// start failure tears storage back down here.
    pub fn start(&self) -> Result<CommandReport> {
        let supervisor = self.supervisor();
        let fleet = self.fleet();

        let mut warnings = supervisor.stop_all(&self.spec.services);

        match fleet.bring_up(self.spec) {
            FleetOutcome::Success {
                warnings: fleet_warnings,
            } => warnings.extend(fleet_warnings),
            FleetOutcome::Failure {
                error,
                rollback_warnings,
                ..
            } => {
                for warning in &rollback_warnings {
                    error!("rollback warning: {warning}");
                }
                return Err(error);
            }
        }

        if let Err(err) = supervisor.start_all(&self.spec.services) {
            error!("service start failed: {err}; tearing storage back down");
            let rollback = fleet.tear_down(self.spec);
            for warning in &rollback {
                error!("rollback warning: {warning}");
            }
            supervisor.stop_all(&self.spec.services);
            return Err(err);
        }

        Ok(CommandReport { warnings })
    }

    /// Stops services and tears down all storage. Never aborts early;
    /// individual failures come back as warnings.
    pub fn stop(&self) -> CommandReport {
        let mut warnings = self.supervisor().stop_all(&self.spec.services);
        warnings.extend(self.fleet().tear_down(self.spec));
        CommandReport { warnings }
    }

    /// Brings up storage without touching services.
    pub fn unlock_only(&self) -> Result<CommandReport> {
        match self.fleet().bring_up(self.spec) {
            FleetOutcome::Success { warnings } => Ok(CommandReport { warnings }),
            FleetOutcome::Failure {
                error,
                rollback_warnings,
                ..
            } => {
                for warning in &rollback_warnings {
                    error!("rollback warning: {warning}");
                }
                Err(error)
            }
        }
    }

    /// Stops services without touching storage.
    pub fn stop_services_only(&self) -> CommandReport {
        CommandReport {
            warnings: self.supervisor().stop_all(&self.spec.services),
        }
    }

    fn supervisor(&self) -> ServiceSupervisor<'a> {
        ServiceSupervisor::new(self.probe, self.runner)
    }

    fn fleet(&self) -> FleetOrchestrator<'a> {
        let fleet = FleetOrchestrator::new(self.probe, self.runner, self.identity)
            .with_mount_root(self.mount_root.clone());
        match self.device_wait {
            Some((attempts, delay)) => fleet.with_device_wait(attempts, delay),
            None => fleet,
        }
    }
}
