//! Read-only state probes.
//!
//! Drivers never trust remembered state: immediately before acting they ask
//! a [`Probe`] what the OS reports *right now*. Probes only ever see real
//! identifiers; disabled slots are filtered out by the drivers before a
//! probe is consulted.
//!
//! `lv_active` parsing is isolated here so the detection strategy can
//! change without touching orchestration logic.

use std::path::Path;

use crate::error::Result;
use crate::runner::Runner;

/// Live view of resource state. Pure queries, never mutates.
pub trait Probe {
    /// True iff an active device-mapper mapping exists under this name.
    fn encryption_open(&self, mapper: &str) -> Result<bool>;

    /// True iff the logical volume exists in the group at all.
    ///
    /// Kept separate from [`Probe::volume_active`]: "doesn't exist" is a
    /// configuration problem, "exists but inactive" is ordinary state.
    fn volume_known(&self, volume: &str, group: &str) -> Result<bool>;

    /// True iff the logical volume reports active status.
    fn volume_active(&self, volume: &str, group: &str) -> Result<bool>;

    /// True iff the path is currently a mount point.
    fn mounted(&self, mount_point: &Path) -> Result<bool>;

    /// True iff the systemd unit is active.
    fn service_active(&self, unit: &str) -> Result<bool>;

    /// True iff a block device with this filesystem UUID is visible.
    fn block_device_present(&self, uuid: &str) -> bool;

    /// True iff the device-mapper node exists on disk.
    fn mapper_node_present(&self, mapper: &str) -> bool;
}

/// [`Probe`] implementation querying the live system.
pub struct SystemProbe<'r> {
    runner: &'r dyn Runner,
}

impl<'r> SystemProbe<'r> {
    pub fn new(runner: &'r dyn Runner) -> Self {
        Self { runner }
    }
}

impl Probe for SystemProbe<'_> {
    fn encryption_open(&self, mapper: &str) -> Result<bool> {
        // The mapper node is authoritative when present; `cryptsetup status`
        // covers mappings that exist without a node yet.
        if self.mapper_node_present(mapper) {
            return Ok(true);
        }
        let out = self.runner.run("cryptsetup", &["status", mapper])?;
        Ok(out.success())
    }

    fn volume_known(&self, volume: &str, group: &str) -> Result<bool> {
        let target = format!("{group}/{volume}");
        let out = self.runner.run("lvs", &[&target])?;
        Ok(out.success())
    }

    fn volume_active(&self, volume: &str, group: &str) -> Result<bool> {
        let target = format!("{group}/{volume}");
        let out = self
            .runner
            .run("lvs", &["--noheadings", "-o", "lv_active", &target])?;
        Ok(out.success() && out.stdout.trim() == "active")
    }

    fn mounted(&self, mount_point: &Path) -> Result<bool> {
        let target = mount_point.to_string_lossy();
        let out = self.runner.run("mountpoint", &["-q", &target])?;
        Ok(out.success())
    }

    fn service_active(&self, unit: &str) -> Result<bool> {
        let out = self
            .runner
            .run("systemctl", &["is-active", "--quiet", unit])?;
        Ok(out.success())
    }

    fn block_device_present(&self, uuid: &str) -> bool {
        Path::new("/dev/disk/by-uuid").join(uuid).exists()
    }

    fn mapper_node_present(&self, mapper: &str) -> bool {
        Path::new("/dev/mapper").join(mapper).exists()
    }
}
