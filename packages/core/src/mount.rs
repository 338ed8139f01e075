//! Filesystem mount driver for unlocked devices.
//!
//! Mounts `/dev/mapper/<mapper>` at its mount point, creating the directory
//! if needed. When the mapper node is absent the mount is *skipped with a
//! warning* rather than failed: an earlier stage may have been left half
//! done out-of-band, and the rest of the fleet should still come up.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use snafu::ResultExt;

use crate::config::DeviceSpec;
use crate::error::{Error, MountPointCreationSnafu, Result, Warning};
use crate::identity::IdentityResolver;
use crate::probe::Probe;
use crate::runner::Runner;
use crate::step::StepOutcome;

pub struct MountDriver<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
    identity: &'a dyn IdentityResolver,
}

impl<'a> MountDriver<'a> {
    pub fn new(
        probe: &'a dyn Probe,
        runner: &'a dyn Runner,
        identity: &'a dyn IdentityResolver,
    ) -> Self {
        Self {
            probe,
            runner,
            identity,
        }
    }

    pub fn bring_up(&self, spec: &DeviceSpec, mount_root: &Path) -> Result<StepOutcome> {
        let (Some(mapper), Some(mount_point)) =
            (spec.mapper.as_deref(), spec.mount_point(mount_root))
        else {
            return Ok(StepOutcome::Disabled);
        };

        if self.probe.mounted(&mount_point)? {
            debug!("{} already mounted", mount_point.display());
            return Ok(StepOutcome::AlreadyInPlace);
        }

        if !self.probe.mapper_node_present(mapper) {
            let warning = Warning::new(
                mapper,
                format!(
                    "mapper node missing, not mounting {}",
                    mount_point.display()
                ),
            );
            warn!("{warning}");
            return Ok(StepOutcome::Skipped(warning));
        }

        let options = self.resolve_options(spec)?;
        create_mount_point(&mount_point)?;

        let device = format!("/dev/mapper/{mapper}");
        let target = mount_point.to_string_lossy().into_owned();
        let mut args = vec![device.as_str(), target.as_str()];
        if let Some(options) = options.as_deref() {
            args.push("-o");
            args.push(options);
        }

        let out = self.runner.run("mount", &args)?;
        if !out.success() {
            return Err(Error::MountFailed {
                source_device: device,
                mount_point,
                stderr: out.diagnostic().to_string(),
            });
        }

        info!("mounted {device} at {}", mount_point.display());
        Ok(StepOutcome::Applied)
    }

    /// Unmounts the device's mount point. Best effort.
    pub fn tear_down(&self, spec: &DeviceSpec, mount_root: &Path) -> Option<Warning> {
        let mount_point = spec.mount_point(mount_root)?;
        spec.mapper.as_deref()?;
        unmount(self.probe, self.runner, &mount_point)
    }

    fn resolve_options(&self, spec: &DeviceSpec) -> Result<Option<String>> {
        let uid = spec
            .owner_user
            .as_deref()
            .map(|user| self.identity.uid_of(user))
            .transpose()?;
        let gid = spec
            .owner_group
            .as_deref()
            .map(|group| self.identity.gid_of(group))
            .transpose()?;
        Ok(assemble_options(spec.mount_options.as_deref(), uid, gid))
    }
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).context(MountPointCreationSnafu { path })?;
    }
    Ok(())
}

/// Shared unmount step used by the device and share drivers.
pub(crate) fn unmount(
    probe: &dyn Probe,
    runner: &dyn Runner,
    mount_point: &Path,
) -> Option<Warning> {
    let target = mount_point.to_string_lossy().into_owned();

    match probe.mounted(mount_point) {
        Ok(false) => {
            debug!("{target} not mounted");
            return None;
        }
        Ok(true) => {}
        Err(err) => {
            let warning = Warning::new(&target, format!("state probe failed: {err}"));
            warn!("{warning}");
            return Some(warning);
        }
    }

    let warning = match runner.run("umount", &[&target]) {
        Ok(out) if out.success() => {
            info!("unmounted {target}");
            return None;
        }
        Ok(out) => Warning::new(&target, format!("unmount failed: {}", out.diagnostic())),
        Err(err) => Warning::new(&target, format!("unmount failed: {err}")),
    };
    warn!("{warning}");
    Some(warning)
}

/// Builds the `-o` option string from ownership and extra options.
///
/// A bare "defaults" never gets combined with explicit keys; mixing the two
/// is rejected by several mount helpers.
fn assemble_options(extra: Option<&str>, uid: Option<u32>, gid: Option<u32>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(uid) = uid {
        parts.push(format!("uid={uid}"));
    }
    if let Some(gid) = gid {
        parts.push(format!("gid={gid}"));
    }
    if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
        if !(extra == "defaults" && !parts.is_empty()) {
            parts.push(extra.to_string());
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
