//! Test doubles shared by the driver and orchestrator tests.
//!
//! [`FakeHost`] plays both the command runner and the probe: mutating
//! commands update a small in-memory model of the host (mapper table, LVM
//! state, mount table, unit states) and probes read that model back. Tests
//! can force any command to fail by substring match, which leaves the model
//! untouched, like a failed tool invocation would.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::probe::Probe;
use crate::runner::{display_command, RunOutput, Runner};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    pub open_mappers: HashSet<String>,
    pub mapper_nodes: HashSet<String>,
    /// "group/volume" -> active
    pub volumes: HashMap<String, bool>,
    pub mounted: HashSet<PathBuf>,
    pub active_services: HashSet<String>,
    pub present_devices: HashSet<String>,
}

pub struct FakeHost {
    state: RefCell<HostState>,
    /// Every runner invocation, in order, as a display string.
    pub calls: RefCell<Vec<String>>,
    fail_contains: RefCell<Vec<String>>,
    /// Mappers whose /dev/mapper node never appears even after unlock.
    suppressed_nodes: RefCell<HashSet<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(HostState::default()),
            calls: RefCell::new(Vec::new()),
            fail_contains: RefCell::new(Vec::new()),
            suppressed_nodes: RefCell::new(HashSet::new()),
        }
    }

    /// Makes a block device visible under its UUID.
    pub fn add_device(&self, uuid: &str) {
        self.state
            .borrow_mut()
            .present_devices
            .insert(uuid.to_string());
    }

    pub fn add_volume(&self, group: &str, volume: &str, active: bool) {
        self.state
            .borrow_mut()
            .volumes
            .insert(format!("{group}/{volume}"), active);
    }

    pub fn add_open_mapper(&self, mapper: &str) {
        let mut state = self.state.borrow_mut();
        state.open_mappers.insert(mapper.to_string());
        state.mapper_nodes.insert(mapper.to_string());
    }

    pub fn add_mount(&self, mount_point: &Path) {
        self.state
            .borrow_mut()
            .mounted
            .insert(mount_point.to_path_buf());
    }

    pub fn add_active_service(&self, unit: &str) {
        self.state
            .borrow_mut()
            .active_services
            .insert(unit.to_string());
    }

    /// Forces every command whose display string contains `fragment` to
    /// fail without touching the host model.
    pub fn fail_when(&self, fragment: &str) {
        self.fail_contains.borrow_mut().push(fragment.to_string());
    }

    /// Unlocking this mapper succeeds but its /dev/mapper node never shows
    /// up, mimicking a stalled udev.
    pub fn suppress_mapper_node(&self, mapper: &str) {
        self.suppressed_nodes.borrow_mut().insert(mapper.to_string());
        self.state.borrow_mut().mapper_nodes.remove(mapper);
    }

    pub fn snapshot(&self) -> HostState {
        self.state.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.contains(fragment))
            .count()
    }

    fn dispatch(&self, program: &str, args: &[&str]) -> RunOutput {
        let command = display_command(program, args);
        self.calls.borrow_mut().push(command.clone());

        if self
            .fail_contains
            .borrow()
            .iter()
            .any(|fragment| command.contains(fragment))
        {
            return failure("forced failure");
        }

        let mut state = self.state.borrow_mut();
        match (program, args) {
            ("cryptsetup", ["--version"]) => ok_with("cryptsetup 2.7.2 flags: UDEV BLKID"),
            ("cryptsetup", ["status", mapper]) => {
                status_of(state.open_mappers.contains(*mapper))
            }
            ("cryptsetup", ["open", "--type", _, _, mapper, ..]) => {
                state.open_mappers.insert(mapper.to_string());
                if !self.suppressed_nodes.borrow().contains(*mapper) {
                    state.mapper_nodes.insert(mapper.to_string());
                }
                ok()
            }
            ("cryptsetup", ["close", mapper]) => {
                state.open_mappers.remove(*mapper);
                state.mapper_nodes.remove(*mapper);
                ok()
            }
            ("lvs", ["--noheadings", "-o", "lv_active", target]) => {
                match state.volumes.get(*target) {
                    Some(true) => ok_with("  active"),
                    Some(false) => ok_with("  "),
                    None => failure("not found"),
                }
            }
            ("lvs", [target]) => status_of(state.volumes.contains_key(*target)),
            ("lvchange", ["-ay", target]) => {
                if let Some(active) = state.volumes.get_mut(*target) {
                    *active = true;
                    ok()
                } else {
                    failure("Volume group not found")
                }
            }
            ("lvchange", ["-an", target]) => {
                if let Some(active) = state.volumes.get_mut(*target) {
                    *active = false;
                }
                ok()
            }
            ("mount", _) => {
                if let Some(mount_point) = positional(args, 1) {
                    state.mounted.insert(PathBuf::from(mount_point));
                }
                ok()
            }
            ("umount", [mount_point]) => {
                state.mounted.remove(Path::new(*mount_point));
                ok()
            }
            ("mountpoint", ["-q", mount_point]) => {
                status_of(state.mounted.contains(Path::new(*mount_point)))
            }
            ("systemctl", ["is-active", "--quiet", unit]) => {
                status_of(state.active_services.contains(*unit))
            }
            ("systemctl", ["daemon-reload"]) => ok(),
            ("systemctl", ["start", unit]) => {
                state.active_services.insert(unit.to_string());
                ok()
            }
            ("systemctl", ["stop", unit]) => {
                state.active_services.remove(*unit);
                ok()
            }
            _ => failure(&format!("fake host cannot interpret '{command}'")),
        }
    }
}

impl Runner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        Ok(self.dispatch(program, args))
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        Ok(self.dispatch(program, args))
    }
}

impl Probe for FakeHost {
    fn encryption_open(&self, mapper: &str) -> Result<bool> {
        Ok(self.state.borrow().open_mappers.contains(mapper))
    }

    fn volume_known(&self, volume: &str, group: &str) -> Result<bool> {
        Ok(self
            .state
            .borrow()
            .volumes
            .contains_key(&format!("{group}/{volume}")))
    }

    fn volume_active(&self, volume: &str, group: &str) -> Result<bool> {
        Ok(self
            .state
            .borrow()
            .volumes
            .get(&format!("{group}/{volume}"))
            .copied()
            .unwrap_or(false))
    }

    fn mounted(&self, mount_point: &Path) -> Result<bool> {
        Ok(self.state.borrow().mounted.contains(mount_point))
    }

    fn service_active(&self, unit: &str) -> Result<bool> {
        Ok(self.state.borrow().active_services.contains(unit))
    }

    fn block_device_present(&self, uuid: &str) -> bool {
        self.state.borrow().present_devices.contains(uuid)
    }

    fn mapper_node_present(&self, mapper: &str) -> bool {
        self.state.borrow().mapper_nodes.contains(mapper)
    }
}

/// Identity resolver with a fixed user table.
pub struct FakeIdentity;

impl IdentityResolver for FakeIdentity {
    fn uid_of(&self, user: &str) -> Result<u32> {
        match user {
            "root" => Ok(0),
            "storaged" => Ok(1000),
            _ => Err(crate::error::Error::UserNotFound { user: user.into() }),
        }
    }

    fn gid_of(&self, group: &str) -> Result<u32> {
        match group {
            "root" => Ok(0),
            "storaged" => Ok(1000),
            _ => Err(crate::error::Error::GroupNotFound {
                group: group.into(),
            }),
        }
    }
}

fn ok() -> RunOutput {
    RunOutput {
        status: 0,
        stdout: String::new(),
        stderr: String::new(),
    }
}

fn ok_with(stdout: &str) -> RunOutput {
    RunOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> RunOutput {
    RunOutput {
        status: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn status_of(value: bool) -> RunOutput {
    if value {
        ok()
    } else {
        failure("")
    }
}

/// The n-th positional argument, skipping flags and their values.
fn positional<'a>(args: &[&'a str], index: usize) -> Option<&'a str> {
    let mut seen = 0;
    let mut skip_next = false;
    for &arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if matches!(arg, "-t" | "-o") {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        if seen == index {
            return Some(arg);
        }
        seen += 1;
    }
    None
}
