//! vaultmount-core: Core library for encrypted-storage host orchestration.
//!
//! This library brings a server's encrypted storage online or offline in a
//! safe, idempotent, dependency-ordered sequence, then starts or stops the
//! application services depending on that storage. Every driver re-probes
//! live OS state immediately before acting; no remembered state is ever
//! trusted.
//!
//! # Modules
//!
//! - [`config`]: Descriptor types (devices, share, services)
//! - [`runner`]: External-command execution seam with timeouts
//! - [`probe`]: Read-only state probes
//! - [`volume`], [`crypt`], [`mount`], [`share`], [`service`]: Resource drivers
//! - [`device`]: Per-device bring-up/tear-down pipeline
//! - [`fleet`]: Fleet-wide ordering and rollback
//! - [`supervisor`]: Application service supervision
//! - [`controller`]: Top-level operator commands
//! - [`identity`]: User/group resolution and the root gate
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use vaultmount_core::{
//!     config::FleetSpec,
//!     controller::SystemController,
//!     identity::SystemIdentity,
//!     probe::SystemProbe,
//!     runner::SystemRunner,
//! };
//!
//! let spec: FleetSpec = serde_json::from_str(r#"{
//!     "primary": {
//!         "name": "data",
//!         "uuid": "26ad8d9e-4f2b-4f2b-8000-0123456789ab",
//!         "mapper": "data_crypt",
//!         "mount_name": "data"
//!     }
//! }"#).unwrap();
//! spec.validate().unwrap();
//!
//! let runner = SystemRunner::new();
//! let probe = SystemProbe::new(&runner);
//! let identity = SystemIdentity;
//! let controller = SystemController::new(&spec, &probe, &runner, &identity);
//!
//! controller.preflight().unwrap();
//! let report = controller.start().unwrap();
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! ```

pub mod config;
pub mod controller;
pub mod crypt;
pub mod device;
pub mod error;
pub mod fleet;
pub mod identity;
pub mod mount;
pub mod probe;
pub mod runner;
pub mod service;
pub mod share;
pub mod step;
pub mod supervisor;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{DeviceSpec, EncryptionKind, FleetSpec, ServiceSpec, ShareSpec};
pub use controller::{CommandReport, SystemController};
pub use error::{Error, Result, Warning};
pub use fleet::{FleetOrchestrator, FleetOutcome};
pub use runner::{Runner, SystemRunner};
pub use step::StepOutcome;
