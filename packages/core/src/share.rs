//! Network share driver.
//!
//! Mount-only pipeline for the CIFS/NFS share slot: no encryption or
//! volume stage. When a credentials file is configured it is passed as
//! `credentials=<path>` ahead of any extra options.

use std::path::Path;

use log::{debug, info};

use crate::config::ShareSpec;
use crate::error::{Error, Result, Warning};
use crate::mount::{create_mount_point, unmount};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::step::StepOutcome;

pub struct ShareDriver<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
}

impl<'a> ShareDriver<'a> {
    pub fn new(probe: &'a dyn Probe, runner: &'a dyn Runner) -> Self {
        Self { probe, runner }
    }

    pub fn bring_up(&self, spec: &ShareSpec, mount_root: &Path) -> Result<StepOutcome> {
        let (Some(protocol), Some(mount_point)) = (spec.protocol, spec.mount_point(mount_root))
        else {
            return Ok(StepOutcome::Disabled);
        };

        if self.probe.mounted(&mount_point)? {
            debug!("{} already mounted", mount_point.display());
            return Ok(StepOutcome::AlreadyInPlace);
        }

        create_mount_point(&mount_point)?;

        let options = share_options(spec);
        let target = mount_point.to_string_lossy().into_owned();
        let mut args = vec!["-t", protocol.fs_type(), spec.address.as_str(), &target];
        if let Some(options) = options.as_deref() {
            args.push("-o");
            args.push(options);
        }

        let out = self.runner.run("mount", &args)?;
        if !out.success() {
            return Err(Error::MountFailed {
                source_device: spec.address.clone(),
                mount_point,
                stderr: out.diagnostic().to_string(),
            });
        }

        info!("mounted {} at {}", spec.address, mount_point.display());
        Ok(StepOutcome::Applied)
    }

    /// Unmounts the share. Best effort.
    pub fn tear_down(&self, spec: &ShareSpec, mount_root: &Path) -> Option<Warning> {
        spec.protocol?;
        let mount_point = spec.mount_point(mount_root)?;
        unmount(self.probe, self.runner, &mount_point)
    }
}

fn share_options(spec: &ShareSpec) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(credentials) = &spec.credentials {
        parts.push(format!("credentials={}", credentials.display()));
    }
    if let Some(extra) = spec.mount_options.as_deref().map(str::trim) {
        if !extra.is_empty() {
            parts.push(extra.to_string());
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
