//! Fleet-level orchestration across all configured devices and the share.
//!
//! Bring-up walks the declared order (primary device, secondaries, network
//! share last) sequentially; devices may depend on their predecessors and
//! the underlying tools do not tolerate concurrent invocation. On the
//! first fatal error the remaining slots are abandoned and everything
//! attempted so far, including the failed slot, is torn down in reverse.
//! A failed start therefore leaves the host fully off, never half-up.

use std::path::PathBuf;
use std::time::Duration;

use log::{error, info};

use crate::config::{FleetSpec, MOUNT_ROOT};
use crate::device::{DeviceBringUp, DeviceOrchestrator, Stage};
use crate::error::{Error, Warning};
use crate::identity::IdentityResolver;
use crate::probe::Probe;
use crate::runner::Runner;
use crate::share::ShareDriver;

/// Result of a fleet bring-up.
#[derive(Debug)]
pub enum FleetOutcome {
    Success {
        warnings: Vec<Warning>,
    },
    /// A slot failed fatally; the whole run was rolled back.
    Failure {
        slot: String,
        stage: Stage,
        error: Error,
        rollback_warnings: Vec<Warning>,
    },
}

impl FleetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FleetOutcome::Success { .. })
    }
}

pub struct FleetOrchestrator<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
    identity: &'a dyn IdentityResolver,
    mount_root: PathBuf,
    device_wait: Option<(u32, Duration)>,
}

impl<'a> FleetOrchestrator<'a> {
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

    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }

    pub fn with_device_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.device_wait = Some((attempts, delay));
        self
    }

    /// Brings up every configured slot, or rolls the run back entirely.
    pub fn bring_up(&self, spec: &FleetSpec) -> FleetOutcome {
        let devices = self.device_orchestrator();
        let mut warnings = Vec::new();

        for (index, device) in spec.devices().enumerate() {
            info!("bringing up device '{}'", device.name);
            match devices.bring_up(device) {
                DeviceBringUp::Completed {
                    warnings: device_warnings,
                } => warnings.extend(device_warnings),
                DeviceBringUp::Failed { stage, error } => {
                    error!(
                        "device '{}' failed in {stage} stage: {error}; rolling back",
                        device.name
                    );
                    let rollback_warnings = self.roll_back(spec, index);
                    return FleetOutcome::Failure {
                        slot: device.name.clone(),
                        stage,
                        error,
                        rollback_warnings,
                    };
                }
            }
        }

        if let Some(share) = &spec.share {
            info!("bringing up network share {}", share.address);
            let driver = ShareDriver::new(self.probe, self.runner);
            match driver.bring_up(share, &self.mount_root) {
                Ok(outcome) => warnings.extend(outcome.warning().cloned()),
                Err(err) => {
                    error!("network share failed: {err}; rolling back");
                    let mut rollback_warnings =
                        driver.tear_down(share, &self.mount_root).into_iter().collect::<Vec<_>>();
                    rollback_warnings
                        .extend(self.roll_back(spec, spec.devices().count().saturating_sub(1)));
                    return FleetOutcome::Failure {
                        slot: share.address.clone(),
                        stage: Stage::Mount,
                        error: err,
                        rollback_warnings,
                    };
                }
            }
        }

        FleetOutcome::Success { warnings }
    }

    /// Tears down every configured slot in reverse declared order.
    ///
    /// Always sweeps the full fleet from probed live state; individual
    /// failures are aggregated as warnings and never stop the sweep. This
    /// also cleans up after a crashed earlier run, which is why no
    /// remembered bring-up list is consulted.
    pub fn tear_down(&self, spec: &FleetSpec) -> Vec<Warning> {
        let devices = self.device_orchestrator();
        let mut warnings = Vec::new();

        if let Some(share) = &spec.share {
            info!("tearing down network share {}", share.address);
            warnings.extend(
                ShareDriver::new(self.probe, self.runner).tear_down(share, &self.mount_root),
            );
        }

        let declared: Vec<_> = spec.devices().collect();
        for device in declared.into_iter().rev() {
            info!("tearing down device '{}'", device.name);
            warnings.extend(devices.tear_down(device));
        }

        warnings
    }

    /// Tears down devices `0..=last_attempted` in reverse order.
    ///
    /// The failed device is included: whatever partial state it acquired
    /// must be released too.
    fn roll_back(&self, spec: &FleetSpec, last_attempted: usize) -> Vec<Warning> {
        let devices = self.device_orchestrator();
        let attempted: Vec<_> = spec.devices().take(last_attempted + 1).collect();
        let mut warnings = Vec::new();
        for device in attempted.into_iter().rev() {
            info!("rolling back device '{}'", device.name);
            warnings.extend(devices.tear_down(device));
        }
        warnings
    }

    fn device_orchestrator(&self) -> DeviceOrchestrator<'a> {
        let orch = DeviceOrchestrator::new(self.probe, self.runner, self.identity)
            .with_mount_root(self.mount_root.clone());
        match self.device_wait {
            Some((attempts, delay)) => orch.with_device_wait(attempts, delay),
            None => orch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceSpec, EncryptionKind, ShareProtocol, ShareSpec};
    use crate::test_support::{FakeHost, FakeIdentity};
    use tempfile::TempDir;

    fn device(name: &str, uuid: &str) -> DeviceSpec {
        DeviceSpec {
            name: name.into(),
            uuid: Some(uuid.into()),
            mapper: Some(format!("{name}_crypt")),
            kind: EncryptionKind::Luks,
            key_file: None,
            volume: Some(name.into()),
            volume_group: Some(format!("vg_{name}")),
            mount_name: Some(name.into()),
            owner_user: None,
            owner_group: None,
            mount_options: None,
        }
    }

    fn three_device_fleet() -> FleetSpec {
        FleetSpec {
            primary: device("data", "uuid-data"),
            secondary: vec![device("media", "uuid-media"), device("scratch", "uuid-scratch")],
            share: None,
            services: Vec::new(),
            min_cryptsetup_version: None,
        }
    }

    fn prepare(host: &FakeHost, spec: &FleetSpec) {
        for device in spec.devices() {
            host.add_device(device.uuid.as_deref().unwrap());
            if let Some((volume, group)) = device.volume_ref() {
                host.add_volume(group, volume, false);
            }
        }
    }

    fn orchestrator<'a>(host: &'a FakeHost, root: &TempDir) -> FleetOrchestrator<'a> {
        FleetOrchestrator::new(host, host, &FakeIdentity)
            .with_mount_root(root.path())
            .with_device_wait(2, Duration::ZERO)
    }

    #[test]
    fn brings_up_all_devices_in_declared_order() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        let root = tempfile::tempdir().unwrap();

        let outcome = orchestrator(&host, &root).bring_up(&spec);
        assert!(outcome.is_success());
        for device in spec.devices() {
            assert!(host.mounted(&root.path().join(&device.name)).unwrap());
        }

        // Primary's unlock happens before any secondary's.
        let calls = host.calls.borrow();
        let data = calls.iter().position(|c| c.contains("data_crypt")).unwrap();
        let media = calls.iter().position(|c| c.contains("media_crypt")).unwrap();
        assert!(data < media);
    }

    #[test]
    fn fatal_failure_rolls_back_everything_attempted() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        let before = host.snapshot();
        // Device 2's unlock fails fatally.
        host.fail_when("cryptsetup open --type luks /dev/disk/by-uuid/uuid-media");
        let root = tempfile::tempdir().unwrap();

        let outcome = orchestrator(&host, &root).bring_up(&spec);
        match outcome {
            FleetOutcome::Failure { slot, stage, .. } => {
                assert_eq!(slot, "media");
                assert_eq!(stage, Stage::Encryption);
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // Probed state is back to fully-off, and device 3 was never touched.
        assert_eq!(host.snapshot(), before);
        assert_eq!(host.calls_matching("scratch"), 0);
    }

    #[test]
    fn non_fatal_mapper_skip_does_not_roll_back() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        host.suppress_mapper_node("media_crypt");
        let root = tempfile::tempdir().unwrap();

        match orchestrator(&host, &root).bring_up(&spec) {
            FleetOutcome::Success { warnings } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].subject.contains("media_crypt"));
            }
            other => panic!("expected success with warning, got {other:?}"),
        }

        // Devices 1 and 3 fully up; device 2's earlier stages stay up too.
        assert!(host.mounted(&root.path().join("data")).unwrap());
        assert!(host.mounted(&root.path().join("scratch")).unwrap());
        assert!(!host.mounted(&root.path().join("media")).unwrap());
        assert!(host.volume_active("media", "vg_media").unwrap());
        assert!(host.encryption_open("media_crypt").unwrap());
    }

    #[test]
    fn share_comes_up_last_and_its_failure_rolls_back_devices() {
        let mut spec = three_device_fleet();
        spec.share = Some(ShareSpec {
            address: "//nas/backup".into(),
            protocol: Some(ShareProtocol::Cifs),
            credentials: None,
            mount_name: Some("backup".into()),
            mount_options: None,
        });
        let host = FakeHost::new();
        prepare(&host, &spec);
        let before = host.snapshot();
        host.fail_when("-t cifs //nas/backup");
        let root = tempfile::tempdir().unwrap();

        let outcome = orchestrator(&host, &root).bring_up(&spec);
        match outcome {
            FleetOutcome::Failure { slot, .. } => assert_eq!(slot, "//nas/backup"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(host.snapshot(), before);
    }

    #[test]
    fn tear_down_sweeps_in_reverse_and_never_aborts() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        let root = tempfile::tempdir().unwrap();
        let orch = orchestrator(&host, &root);

        assert!(orch.bring_up(&spec).is_success());
        host.fail_when("umount");

        let warnings = orch.tear_down(&spec);
        // One unmount warning per device, and all mappers and volumes are
        // still released despite them.
        assert_eq!(warnings.len(), 3);
        for device in spec.devices() {
            let mapper = device.mapper.as_deref().unwrap();
            assert!(!host.encryption_open(mapper).unwrap());
            let (volume, group) = device.volume_ref().unwrap();
            assert!(!host.volume_active(volume, group).unwrap());
        }
    }

    #[test]
    fn tear_down_works_from_live_state_not_memory() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        let root = tempfile::tempdir().unwrap();

        // Simulate a crashed earlier run: partial state, no bring_up in
        // this process.
        host.add_open_mapper("media_crypt");
        host.add_volume("vg_media", "media", true);
        host.add_mount(&root.path().join("media"));

        let warnings = orchestrator(&host, &root).tear_down(&spec);
        assert!(warnings.is_empty());
        assert!(!host.encryption_open("media_crypt").unwrap());
        assert!(!host.volume_active("media", "vg_media").unwrap());
        assert!(!host.mounted(&root.path().join("media")).unwrap());
    }

    #[test]
    fn round_trip_restores_initial_state() {
        let spec = three_device_fleet();
        let host = FakeHost::new();
        prepare(&host, &spec);
        let before = host.snapshot();
        let root = tempfile::tempdir().unwrap();
        let orch = orchestrator(&host, &root);

        assert!(orch.bring_up(&spec).is_success());
        assert!(orch.tear_down(&spec).is_empty());
        assert_eq!(host.snapshot(), before);
    }
}
