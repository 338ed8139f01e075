//! Unified error types for the vaultmount-core library.
//!
//! Uses SNAFU for context-rich error handling. Only *fatal* conditions are
//! errors; tear-down failures are [`Warning`]s and never surface through
//! this type.

use snafu::Snafu;
use std::fmt;
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Command did not finish within the configured deadline.
    #[snafu(display("command '{command}' timed out after {seconds}s"))]
    CommandTimeout { command: String, seconds: u64 },

    /// Logical volume does not exist in the volume group.
    #[snafu(display("logical volume {group}/{volume} not found"))]
    VolumeNotFound { volume: String, group: String },

    /// `lvchange -ay` failed.
    #[snafu(display("failed to activate logical volume {group}/{volume}: {stderr}"))]
    VolumeActivation {
        volume: String,
        group: String,
        stderr: String,
    },

    /// The backing block device never appeared under /dev/disk/by-uuid.
    #[snafu(display("block device with UUID {uuid} did not appear after {attempts} attempts"))]
    DeviceNotFound { uuid: String, attempts: u32 },

    /// Unlocking the encrypted device failed (wrong key, corrupt header, ...).
    #[snafu(display("failed to unlock {mapper}: {stderr}"))]
    UnlockFailed { mapper: String, stderr: String },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount operation failed.
    #[snafu(display("failed to mount {source_device} at {}: {stderr}", mount_point.display()))]
    MountFailed {
        source_device: String,
        mount_point: PathBuf,
        stderr: String,
    },

    /// `systemctl daemon-reload` failed; unit state can no longer be trusted.
    #[snafu(display("systemd daemon-reload failed: {stderr}"))]
    DaemonReload { stderr: String },

    /// Starting a service unit failed.
    #[snafu(display("failed to start service '{unit}': {stderr}"))]
    ServiceStart { unit: String, stderr: String },

    /// A service slot holds an empty unit name. An unused slot must be
    /// disabled explicitly, not left blank.
    #[snafu(display("empty service unit name (use the disabled sentinel for unused slots)"))]
    InvalidServiceName,

    /// Device has a real UUID but lacks a mapper name or mount point.
    #[snafu(display("device '{device}' is misconfigured: {reason}"))]
    InvalidDeviceConfig { device: String, reason: String },

    /// Username could not be resolved to a UID.
    #[snafu(display("unknown user '{user}'"))]
    UserNotFound { user: String },

    /// Group name could not be resolved to a GID.
    #[snafu(display("unknown group '{group}'"))]
    GroupNotFound { group: String },

    /// Effective UID is not root.
    #[snafu(display("this operation requires root privileges"))]
    NotRoot,

    /// A required external tool is not installed or not on PATH.
    #[snafu(display("required tool '{tool}' not found"))]
    ToolMissing { tool: String },

    /// Installed tool is older than the configured minimum.
    #[snafu(display("{tool} {found} is older than required minimum {required}"))]
    ToolVersionTooOld {
        tool: String,
        found: String,
        required: String,
    },

    /// Tool version output could not be parsed.
    #[snafu(display("could not parse version from '{output}'"))]
    VersionParse { output: String },
}

/// A non-fatal diagnostic from the tear-down path.
///
/// Tear-down steps never abort the sweep; their failures are collected as
/// warnings and reported once the sweep completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// The resource the warning concerns (mapper name, mount point, unit...).
    pub subject: String,
    /// Human-readable description of what went wrong.
    pub detail: String,
}

impl Warning {
    pub fn new(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.detail)
    }
}
