#![warn(clippy::pedantic)]
//! Acquisition and lifecycle engine for the Inference toolchain.
//!
//! This crate installs the `infs` toolchain binary from the published
//! release manifest and manages its versions afterwards.
//!
//! ## Install Pipeline
//!
//! ```text
//! manifest -> download -> SHA-256 check -> extract -> infs install -> infs doctor
//! ```
//!
//! [`Provisioner::install`] runs the pipeline and reports progress through
//! [`InstallProgress`] events. Each step is also usable on its own:
//!
//! - [`platform`]: OS/architecture detection and artifact naming
//! - [`version`]: version precedence used for "latest" and update checks
//! - [`manifest`]: manifest validation and release resolution per channel
//! - [`download`]: HTTP fetching with a redirect budget, downgrade
//!   rejection and `.partial` files
//! - [`verify`]: streaming SHA-256 verification
//! - [`archive`]: tar.gz/zip extraction
//! - [`exec`]: bounded subprocess invocation
//! - [`doctor`]: parsing of `infs doctor` reports
//! - [`versions`]: version queries and switching through `infs`
//! - [`detection`]: locating an installed `infs`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inference_provisioner::{ProvisionConfig, Provisioner};
//!
//! # async fn run() -> inference_provisioner::Result<()> {
//! let provisioner = Provisioner::new(ProvisionConfig::from_env()?)?;
//! let result = provisioner
//!     .install(|progress| eprintln!("{}", progress.message()))
//!     .await?;
//! println!("installed infs {} at {}", result.version, result.binary_path.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod detection;
pub mod doctor;
pub mod download;
pub mod errors;
pub mod exec;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod verify;
pub mod version;
pub mod versions;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ProvisionConfig;
pub use doctor::{DoctorCheck, DoctorCheckStatus, DoctorResult};
pub use errors::{ErrorKind, ProvisionError, Result};
pub use install::{
    InstallProgress, InstallResult, InstallStage, Provisioner, SelectOutcome, SelectableVersion,
    UpdateCheck, UpdateOutcome,
};
pub use manifest::{Channel, ReleaseEntry, ReleaseMatch};
pub use platform::{Platform, PlatformInfo};
pub use versions::{Compatibility, MIN_INFS_VERSION, SwitchResult, VersionInfo};
