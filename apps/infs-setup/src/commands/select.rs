//! Select command for the infs-setup CLI.
//!
//! Makes a specific toolchain version the default.
//!
//! ## Usage
//!
//! ```bash
//! infs-setup select 0.2.0
//! ```

use anyhow::{Result, bail};
use clap::Args;
use inference_provisioner::{Provisioner, SelectOutcome};

use super::require_binary;

/// Arguments for the select command.
#[derive(Args)]
pub struct SelectArgs {
    /// Version to make the default (e.g., "0.2.0").
    pub version: String,
}

/// Executes the select command.
///
/// # Errors
///
/// Returns an error if no infs binary is found, another operation is in
/// progress, or the switch fails.
pub async fn execute(provisioner: &Provisioner, args: &SelectArgs) -> Result<()> {
    let path = require_binary(provisioner)?;
    let version = args.version.as_str();

    match provisioner.select_version(&path, version).await? {
        SelectOutcome::AlreadyCurrent => {
            println!("infs {version} is already the default.");
        }
        SelectOutcome::Switched(result) if result.success() => {
            println!("infs {version} is now the default.");
        }
        SelectOutcome::Switched(result) => {
            let detail = result.error().unwrap_or("unknown error");
            if result.installed_but_not_default() {
                bail!(
                    "infs {version} was installed but could not be set as default: {detail}\n\
                    Run 'infs default {version}' to finish."
                );
            }
            bail!("Failed to install infs {version}: {detail}");
        }
    }
    Ok(())
}
