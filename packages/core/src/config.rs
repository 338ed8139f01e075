//! Descriptor types supplied by the configuration provider.
//!
//! The legacy configuration format marks unused slots with the string
//! sentinels `"none"`, `"unconfigured"`, and (for key files)
//! `"interactive"`. Those are absorbed at the serde boundary: inside the
//! core an unused slot is `Option::None` and nothing else. Descriptors are
//! built once at startup and never mutated afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Fixed mount root convention: device `data` mounts at `/mnt/data`.
pub const MOUNT_ROOT: &str = "/mnt";

/// Encryption container format of a storage device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionKind {
    Luks,
    Bitlocker,
}

impl EncryptionKind {
    /// The `--type` argument cryptsetup expects for this format.
    pub fn cryptsetup_type(self) -> &'static str {
        match self {
            EncryptionKind::Luks => "luks",
            EncryptionKind::Bitlocker => "bitlk",
        }
    }
}

/// One configured encrypted storage device.
///
/// A spec with `uuid: None` is a placeholder slot: every pipeline stage
/// treats it as vacuously successful.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSpec {
    /// Logical name, used for the mount point and in diagnostics.
    pub name: String,
    /// Block-device filesystem UUID. `None` disables the whole slot.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub uuid: Option<String>,
    /// Device-mapper name the unlocked device is exposed under.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub mapper: Option<String>,
    /// Encryption container format.
    #[serde(default = "default_kind")]
    pub kind: EncryptionKind,
    /// Key file for non-interactive unlock. `None` means prompt on the tty.
    #[serde(default, deserialize_with = "key_file_sentinel")]
    pub key_file: Option<PathBuf>,
    /// Optional LVM logical volume between raw device and filesystem.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub volume: Option<String>,
    /// Volume group the logical volume lives in.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub volume_group: Option<String>,
    /// Mount point name, relative to [`MOUNT_ROOT`].
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub mount_name: Option<String>,
    /// Owner of the mounted filesystem, passed as `uid=`.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub owner_user: Option<String>,
    /// Owning group of the mounted filesystem, passed as `gid=`.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub owner_group: Option<String>,
    /// Extra mount options, comma-separated.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub mount_options: Option<String>,
}

fn default_kind() -> EncryptionKind {
    EncryptionKind::Luks
}

impl DeviceSpec {
    /// Whether this slot is in use at all.
    pub fn is_configured(&self) -> bool {
        self.uuid.is_some()
    }

    /// The LVM pair, present only when both halves are configured.
    pub fn volume_ref(&self) -> Option<(&str, &str)> {
        match (self.volume.as_deref(), self.volume_group.as_deref()) {
            (Some(volume), Some(group)) => Some((volume, group)),
            _ => None,
        }
    }

    /// Absolute mount point under the given root.
    pub fn mount_point(&self, root: &Path) -> Option<PathBuf> {
        self.mount_name.as_ref().map(|name| root.join(name))
    }

    /// A configured device must name a mapper and a mount point.
    ///
    /// The configuration loader checks this too; the core re-checks so a
    /// broken snapshot yields an error instead of a half-run pipeline.
    pub fn validate(&self) -> Result<()> {
        if !self.is_configured() {
            return Ok(());
        }
        if self.mapper.is_none() {
            return Err(Error::InvalidDeviceConfig {
                device: self.name.clone(),
                reason: "configured UUID without a mapper name".into(),
            });
        }
        if self.mount_name.is_none() {
            return Err(Error::InvalidDeviceConfig {
                device: self.name.clone(),
                reason: "configured UUID without a mount point".into(),
            });
        }
        Ok(())
    }
}

/// Network filesystem protocol for the share slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareProtocol {
    Cifs,
    Nfs,
}

impl ShareProtocol {
    pub fn fs_type(self) -> &'static str {
        match self {
            ShareProtocol::Cifs => "cifs",
            ShareProtocol::Nfs => "nfs",
        }
    }
}

/// One configured network share. Mount-only: no encryption or LVM stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareSpec {
    /// Remote address (`//host/share` or `host:/export`).
    pub address: String,
    /// `None` disables the slot.
    #[serde(default, deserialize_with = "protocol_sentinel")]
    pub protocol: Option<ShareProtocol>,
    /// Credentials file passed to the mount helper.
    #[serde(default, deserialize_with = "path_sentinel")]
    pub credentials: Option<PathBuf>,
    /// Mount point name, relative to [`MOUNT_ROOT`].
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub mount_name: Option<String>,
    /// Extra mount options, comma-separated.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub mount_options: Option<String>,
}

impl ShareSpec {
    pub fn is_configured(&self) -> bool {
        self.protocol.is_some()
    }

    pub fn mount_point(&self, root: &Path) -> Option<PathBuf> {
        self.mount_name.as_ref().map(|name| root.join(name))
    }
}

/// One configured service slot.
///
/// `"none"` disables the slot; an *empty* unit name is kept as
/// `Some("")` so the service driver can reject it as a configuration
/// mistake rather than silently treating it as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct ServiceSpec {
    pub unit: Option<String>,
}

impl From<String> for ServiceSpec {
    fn from(raw: String) -> Self {
        let unit = if is_disabled_sentinel(&raw) && !raw.is_empty() {
            None
        } else {
            Some(raw)
        };
        Self { unit }
    }
}

/// The full configuration snapshot handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetSpec {
    /// Primary storage device, brought up first and torn down last.
    pub primary: DeviceSpec,
    /// Additional devices, in declared order.
    #[serde(default)]
    pub secondary: Vec<DeviceSpec>,
    /// Network share, brought up after every local device.
    #[serde(default)]
    pub share: Option<ShareSpec>,
    /// Application services depending on the storage.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Minimum accepted `cryptsetup` version, checked before any work.
    #[serde(default, deserialize_with = "disabled_sentinel")]
    pub min_cryptsetup_version: Option<String>,
}

impl FleetSpec {
    /// All devices in bring-up order: primary first, then secondaries.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceSpec> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    pub fn validate(&self) -> Result<()> {
        for device in self.devices() {
            device.validate()?;
        }
        Ok(())
    }
}

fn is_disabled_sentinel(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("unconfigured")
}

fn disabled_sentinel<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| !is_disabled_sentinel(value)))
}

fn path_sentinel<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| !is_disabled_sentinel(value))
        .map(PathBuf::from))
}

fn key_file_sentinel<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| {
            !is_disabled_sentinel(value) && !value.eq_ignore_ascii_case("interactive")
        })
        .map(PathBuf::from))
}

fn protocol_sentinel<'de, D>(deserializer: D) -> std::result::Result<Option<ShareProtocol>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) if is_disabled_sentinel(&value) => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("cifs") || value.eq_ignore_ascii_case("smb") => {
            Ok(Some(ShareProtocol::Cifs))
        }
        Some(value) if value.eq_ignore_ascii_case("nfs") => Ok(Some(ShareProtocol::Nfs)),
        Some(value) => Err(D::Error::custom(format!(
            "unknown share protocol '{value}'"
        ))),
    }
}
