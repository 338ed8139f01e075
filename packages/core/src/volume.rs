//! LVM logical volume driver.
//!
//! Activates and deactivates the optional logical-volume layer between the
//! raw device and the encryption mapping. A device without a configured
//! volume/group pair skips this stage entirely.

use log::{debug, info, warn};

use crate::error::{Error, Result, Warning};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::step::StepOutcome;

pub struct VolumeDriver<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
}

impl<'a> VolumeDriver<'a> {
    pub fn new(probe: &'a dyn Probe, runner: &'a dyn Runner) -> Self {
        Self { probe, runner }
    }

    /// Activates the logical volume.
    ///
    /// A missing volume is fatal: the configuration names storage that does
    /// not exist, and no later stage could succeed.
    pub fn bring_up(&self, volume: Option<(&str, &str)>) -> Result<StepOutcome> {
        let Some((volume, group)) = volume else {
            return Ok(StepOutcome::Disabled);
        };

        if !self.probe.volume_known(volume, group)? {
            return Err(Error::VolumeNotFound {
                volume: volume.into(),
                group: group.into(),
            });
        }

        if self.probe.volume_active(volume, group)? {
            debug!("logical volume {group}/{volume} already active");
            return Ok(StepOutcome::AlreadyInPlace);
        }

        let target = format!("{group}/{volume}");
        let out = self.runner.run("lvchange", &["-ay", &target])?;
        if !out.success() {
            return Err(Error::VolumeActivation {
                volume: volume.into(),
                group: group.into(),
                stderr: out.diagnostic().to_string(),
            });
        }

        info!("activated logical volume {target}");
        Ok(StepOutcome::Applied)
    }

    /// Deactivates the logical volume. Best effort: failures become
    /// warnings so the rest of the sweep keeps going.
    pub fn tear_down(&self, volume: Option<(&str, &str)>) -> Option<Warning> {
        let (volume, group) = volume?;
        let target = format!("{group}/{volume}");

        match self.probe.volume_active(volume, group) {
            Ok(false) => {
                debug!("logical volume {target} already inactive");
                return None;
            }
            Ok(true) => {}
            Err(err) => {
                let warning = Warning::new(&target, format!("state probe failed: {err}"));
                warn!("{warning}");
                return Some(warning);
            }
        }

        let warning = match self.runner.run("lvchange", &["-an", &target]) {
            Ok(out) if out.success() => {
                info!("deactivated logical volume {target}");
                return None;
            }
            Ok(out) => Warning::new(
                &target,
                format!("deactivation failed: {}", out.diagnostic()),
            ),
            Err(err) => Warning::new(&target, format!("deactivation failed: {err}")),
        };
        warn!("{warning}");
        Some(warning)
    }
}
