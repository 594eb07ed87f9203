//! Command modules for the infs-setup CLI.
//!
//! ## Installation
//!
//! - [`install`] - Install the newest toolchain release
//! - [`update`] - Switch to the newest available version
//! - [`select`] - Make a specific version the default
//!
//! ## Inspection
//!
//! - [`versions`] - List versions available for this platform
//! - [`doctor`] - Run the toolchain self-check
//! - [`detect`] - Print the path of the infs binary in use

use std::path::PathBuf;

use anyhow::{Result, bail};
use inference_provisioner::Provisioner;

pub mod detect;
pub mod doctor;
pub mod install;
pub mod select;
pub mod update;
pub mod versions;

/// Returns the detected infs binary or an error telling the user how to get
/// one.
pub(crate) fn require_binary(provisioner: &Provisioner) -> Result<PathBuf> {
    match provisioner.detect_binary() {
        Some(path) => Ok(path),
        None => bail!(
            "infs binary not found.\n\n\
            To install:\n  \
            - Run: infs-setup install\n  \
            - Or set INFS_PATH environment variable to the infs binary path"
        ),
    }
}
