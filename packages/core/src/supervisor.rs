//! Application service supervision.
//!
//! Starts and stops the configured units around storage transitions.
//! Startup reloads the systemd unit definitions once first; if that fails
//! nothing systemd reports afterwards can be trusted, so it is fatal.

use log::info;

use crate::config::ServiceSpec;
use crate::error::{Error, Result, Warning};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::service::ServiceDriver;

pub struct ServiceSupervisor<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
}

impl<'a> ServiceSupervisor<'a> {
    pub fn new(probe: &'a dyn Probe, runner: &'a dyn Runner) -> Self {
        Self { probe, runner }
    }

    /// Starts every configured unit in declared order.
    ///
    /// The first failure aborts and is surfaced; rolling storage back in
    /// response is the controller's decision, not ours.
    pub fn start_all(&self, services: &[ServiceSpec]) -> Result<()> {
        if services.iter().all(|s| s.unit.is_none()) {
            info!("no services configured");
            return Ok(());
        }

        self.daemon_reload()?;

        let driver = ServiceDriver::new(self.probe, self.runner);
        for service in services {
            driver.bring_up(service)?;
        }
        Ok(())
    }

    /// Stops every configured unit in declared order. Best effort: each
    /// failure is collected and the loop continues.
    pub fn stop_all(&self, services: &[ServiceSpec]) -> Vec<Warning> {
        let driver = ServiceDriver::new(self.probe, self.runner);
        services
            .iter()
            .filter_map(|service| driver.tear_down(service))
            .collect()
    }

    fn daemon_reload(&self) -> Result<()> {
        let out = self.runner.run("systemctl", &["daemon-reload"])?;
        if !out.success() {
            return Err(Error::DaemonReload {
                stderr: out.diagnostic().to_string(),
            });
        }
        Ok(())
    }
}
