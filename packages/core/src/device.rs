//! Per-device orchestration pipeline.
//!
//! Bring-up runs Volume -> Encryption -> Mount and stops at the first
//! fatal error; completed earlier stages are deliberately left in place
//! for the fleet-level rollback to release. Tear-down runs the exact
//! mirror, Mount -> Encryption -> Volume, and always finishes: its steps
//! only ever produce warnings.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;

use crate::config::{DeviceSpec, MOUNT_ROOT};
use crate::crypt::CryptDriver;
use crate::error::{Error, Warning};
use crate::identity::IdentityResolver;
use crate::mount::MountDriver;
use crate::probe::Probe;
use crate::runner::Runner;
use crate::volume::VolumeDriver;

/// Pipeline stage a fatal bring-up error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Descriptor self-check before any stage runs.
    Config,
    Volume,
    Encryption,
    Mount,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Volume => "volume",
            Stage::Encryption => "encryption",
            Stage::Mount => "mount",
        };
        f.write_str(name)
    }
}

/// Terminal state of one device's bring-up.
#[derive(Debug)]
pub enum DeviceBringUp {
    /// All stages done (or vacuously skipped); non-fatal skips are carried
    /// as warnings.
    Completed { warnings: Vec<Warning> },
    /// A stage failed fatally; later stages did not run.
    Failed { stage: Stage, error: Error },
}

impl DeviceBringUp {
    pub fn is_completed(&self) -> bool {
        matches!(self, DeviceBringUp::Completed { .. })
    }
}

/// Drives one device through its bring-up or tear-down pipeline.
pub struct DeviceOrchestrator<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
    identity: &'a dyn IdentityResolver,
    mount_root: PathBuf,
    device_wait: Option<(u32, Duration)>,
}

impl<'a> DeviceOrchestrator<'a> {
    pub fn new(
        probe: &'a dyn Probe,
        runner: &'a dyn Runner,
        identity: &'a dyn IdentityResolver,
    ) -> Self {
        Self {
            probe,
            runner,
            identity,
            mount_root: PathBuf::from(MOUNT_ROOT),
            device_wait: None,
        }
    }

    /// Overrides the mount root. Tests point this at a temp directory.
    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }

    /// Overrides the encrypted-device appearance poll.
    pub fn with_device_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.device_wait = Some((attempts, delay));
        self
    }

    pub fn bring_up(&self, spec: &DeviceSpec) -> DeviceBringUp {
        if !spec.is_configured() {
            debug!("device '{}' unconfigured, nothing to bring up", spec.name);
            return DeviceBringUp::Completed {
                warnings: Vec::new(),
            };
        }
        if let Err(error) = spec.validate() {
            return DeviceBringUp::Failed {
                stage: Stage::Config,
                error,
            };
        }

        let mut warnings = Vec::new();

        if let Err(error) = VolumeDriver::new(self.probe, self.runner).bring_up(spec.volume_ref())
        {
            return DeviceBringUp::Failed {
                stage: Stage::Volume,
                error,
            };
        }

        if let Err(error) = self.crypt_driver().bring_up(spec) {
            return DeviceBringUp::Failed {
                stage: Stage::Encryption,
                error,
            };
        }

        match MountDriver::new(self.probe, self.runner, self.identity)
            .bring_up(spec, &self.mount_root)
        {
            Ok(outcome) => warnings.extend(outcome.warning().cloned()),
            Err(error) => {
                return DeviceBringUp::Failed {
                    stage: Stage::Mount,
                    error,
                };
            }
        }

        DeviceBringUp::Completed { warnings }
    }

    /// Releases everything the device may hold, in reverse stage order.
    ///
    /// Works from probed live state only, so it cleans up after partial
    /// bring-ups and out-of-band changes alike.
    pub fn tear_down(&self, spec: &DeviceSpec) -> Vec<Warning> {
        if !spec.is_configured() {
            debug!("device '{}' unconfigured, nothing to tear down", spec.name);
            return Vec::new();
        }

        let mut warnings = Vec::new();
        warnings.extend(
            MountDriver::new(self.probe, self.runner, self.identity)
                .tear_down(spec, &self.mount_root),
        );
        warnings.extend(self.crypt_driver().tear_down(spec.mapper.as_deref()));
        warnings.extend(VolumeDriver::new(self.probe, self.runner).tear_down(spec.volume_ref()));
        warnings
    }

    fn crypt_driver(&self) -> CryptDriver<'a> {
        let driver = CryptDriver::new(self.probe, self.runner);
        match self.device_wait {
            Some((attempts, delay)) => driver.with_device_wait(attempts, delay),
            None => driver,
        }
    }
}
