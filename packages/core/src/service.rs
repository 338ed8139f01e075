//! Systemd service driver.
//!
//! Starts and stops one application unit. A disabled slot is fine; an
//! *empty* unit name is a configuration mistake and is rejected rather
//! than silently treated as disabled.

use log::{debug, info, warn};

use crate::config::ServiceSpec;
use crate::error::{Error, Result, Warning};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::step::StepOutcome;

pub struct ServiceDriver<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
}

impl<'a> ServiceDriver<'a> {
    pub fn new(probe: &'a dyn Probe, runner: &'a dyn Runner) -> Self {
        Self { probe, runner }
    }

    pub fn bring_up(&self, spec: &ServiceSpec) -> Result<StepOutcome> {
        let Some(unit) = spec.unit.as_deref() else {
            return Ok(StepOutcome::Disabled);
        };
        if unit.is_empty() {
            return Err(Error::InvalidServiceName);
        }

        if self.probe.service_active(unit)? {
            debug!("service {unit} already active");
            return Ok(StepOutcome::AlreadyInPlace);
        }

        let out = self.runner.run("systemctl", &["start", unit])?;
        if !out.success() {
            return Err(Error::ServiceStart {
                unit: unit.into(),
                stderr: out.diagnostic().to_string(),
            });
        }

        info!("started service {unit}");
        Ok(StepOutcome::Applied)
    }

    /// Stops the unit. Best effort: failures become warnings.
    pub fn tear_down(&self, spec: &ServiceSpec) -> Option<Warning> {
        let unit = spec.unit.as_deref()?;
        if unit.is_empty() {
            let warning = Warning::new("services", "empty unit name in configuration");
            warn!("{warning}");
            return Some(warning);
        }

        match self.probe.service_active(unit) {
            Ok(false) => {
                debug!("service {unit} already stopped");
                return None;
            }
            Ok(true) => {}
            Err(err) => {
                let warning = Warning::new(unit, format!("state probe failed: {err}"));
                warn!("{warning}");
                return Some(warning);
            }
        }

        let warning = match self.runner.run("systemctl", &["stop", unit]) {
            Ok(out) if out.success() => {
                info!("stopped service {unit}");
                return None;
            }
            Ok(out) => Warning::new(unit, format!("stop failed: {}", out.diagnostic())),
            Err(err) => Warning::new(unit, format!("stop failed: {err}")),
        };
        warn!("{warning}");
        Some(warning)
    }
}
