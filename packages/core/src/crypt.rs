//! Encrypted container driver.
//!
//! Unlocks (and relocks) LUKS and BitLocker containers via `cryptsetup`.
//! Before unlocking, the driver waits briefly for the backing block device
//! to appear under `/dev/disk/by-uuid`; encrypted disks on slow buses can
//! take a moment to enumerate after boot.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{DeviceSpec, EncryptionKind};
use crate::error::{Error, Result, Warning};
use crate::probe::Probe;
use crate::runner::Runner;
use crate::step::StepOutcome;

const DEVICE_WAIT_ATTEMPTS: u32 = 5;
const DEVICE_WAIT_DELAY: Duration = Duration::from_secs(1);

pub struct CryptDriver<'a> {
    probe: &'a dyn Probe,
    runner: &'a dyn Runner,
    wait_attempts: u32,
    wait_delay: Duration,
}

impl<'a> CryptDriver<'a> {
    pub fn new(probe: &'a dyn Probe, runner: &'a dyn Runner) -> Self {
        Self {
            probe,
            runner,
            wait_attempts: DEVICE_WAIT_ATTEMPTS,
            wait_delay: DEVICE_WAIT_DELAY,
        }
    }

    /// Overrides the device-appearance poll. Tests use a zero delay.
    pub fn with_device_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_delay = delay;
        self
    }

    /// Opens the encrypted container under its mapper name.
    ///
    /// Uses the configured key file when it exists and is readable, and
    /// falls back to interactive secret entry otherwise.
    pub fn bring_up(&self, spec: &DeviceSpec) -> Result<StepOutcome> {
        let (Some(uuid), Some(mapper)) = (spec.uuid.as_deref(), spec.mapper.as_deref()) else {
            return Ok(StepOutcome::Disabled);
        };

        if self.probe.encryption_open(mapper)? {
            debug!("mapping {mapper} already open");
            return Ok(StepOutcome::AlreadyInPlace);
        }

        self.wait_for_device(uuid)?;

        let device = format!("/dev/disk/by-uuid/{uuid}");
        let kind = spec.kind.cryptsetup_type();
        let out = match usable_key_file(spec.key_file.as_deref()) {
            Some(key_file) => {
                let key_file = key_file.to_string_lossy().into_owned();
                self.runner.run(
                    "cryptsetup",
                    &["open", "--type", kind, &device, mapper, "--key-file", &key_file],
                )?
            }
            None => {
                info!("no usable key file for {mapper}, prompting for the secret");
                self.runner
                    .run_interactive("cryptsetup", &["open", "--type", kind, &device, mapper])?
            }
        };

        if !out.success() {
            return Err(Error::UnlockFailed {
                mapper: mapper.into(),
                stderr: out.diagnostic().to_string(),
            });
        }

        info!("unlocked {device} as {mapper}");
        Ok(StepOutcome::Applied)
    }

    /// Closes the mapping. Best effort: failures become warnings.
    pub fn tear_down(&self, mapper: Option<&str>) -> Option<Warning> {
        let mapper = mapper?;

        match self.probe.encryption_open(mapper) {
            Ok(false) => {
                debug!("mapping {mapper} already closed");
                return None;
            }
            Ok(true) => {}
            Err(err) => {
                let warning = Warning::new(mapper, format!("state probe failed: {err}"));
                warn!("{warning}");
                return Some(warning);
            }
        }

        let warning = match self.runner.run("cryptsetup", &["close", mapper]) {
            Ok(out) if out.success() => {
                info!("closed mapping {mapper}");
                return None;
            }
            Ok(out) => Warning::new(mapper, format!("close failed: {}", out.diagnostic())),
            Err(err) => Warning::new(mapper, format!("close failed: {err}")),
        };
        warn!("{warning}");
        Some(warning)
    }

    fn wait_for_device(&self, uuid: &str) -> Result<()> {
        for attempt in 1..=self.wait_attempts {
            if self.probe.block_device_present(uuid) {
                return Ok(());
            }
            if attempt < self.wait_attempts {
                debug!("waiting for block device {uuid} (attempt {attempt})");
                thread::sleep(self.wait_delay);
            }
        }
        Err(Error::DeviceNotFound {
            uuid: uuid.into(),
            attempts: self.wait_attempts,
        })
    }
}

fn usable_key_file(key_file: Option<&Path>) -> Option<PathBuf> {
    let path = key_file?;
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(path.to_path_buf()),
        _ => {
            warn!("key file {} missing or unreadable", path.display());
            None
        }
    }
}

/// Verifies the installed cryptsetup meets the configured minimum version.
///
/// Runs before any device work: an outdated tool failing halfway through a
/// fleet is much worse than refusing upfront.
pub fn ensure_cryptsetup_version(runner: &dyn Runner, minimum: &str) -> Result<()> {
    let out = runner
        .run("cryptsetup", &["--version"])
        .map_err(|_| Error::ToolMissing {
            tool: "cryptsetup".into(),
        })?;
    if !out.success() {
        return Err(Error::ToolMissing {
            tool: "cryptsetup".into(),
        });
    }

    let found = parse_version_output(&out.stdout)?;
    if version_less_than(&found, minimum) {
        return Err(Error::ToolVersionTooOld {
            tool: "cryptsetup".into(),
            found,
            required: minimum.into(),
        });
    }
    Ok(())
}

/// Extracts "2.7.2" from "cryptsetup 2.7.2 flags: ...".
fn parse_version_output(output: &str) -> Result<String> {
    output
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| Error::VersionParse {
            output: output.trim().to_string(),
        })
}

fn version_less_than(found: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| {
                part.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let found = parse(found);
    let minimum = parse(minimum);
    let width = found.len().max(minimum.len());
    for i in 0..width {
        let f = found.get(i).copied().unwrap_or(0);
        let m = minimum.get(i).copied().unwrap_or(0);
        if f != m {
            return f < m;
        }
    }
    false
}
