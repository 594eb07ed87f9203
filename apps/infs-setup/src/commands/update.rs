//! Update command for the infs-setup CLI.
//!
//! Switches the default toolchain to the newest version available for the
//! current platform.

use anyhow::{Result, bail};
use inference_provisioner::{Provisioner, UpdateOutcome};

use super::require_binary;

/// Executes the update command.
///
/// # Errors
///
/// Returns an error if no infs binary is found, another operation is in
/// progress, the installed versions cannot be read, or the switch to the
/// newer version fails.
pub async fn execute(provisioner: &Provisioner) -> Result<()> {
    let path = require_binary(provisioner)?;

    match provisioner.update(&path).await? {
        UpdateOutcome::UpToDate { current } => {
            println!("infs {current} is up to date.");
            Ok(())
        }
        UpdateOutcome::NoCandidates => {
            println!("No infs versions are available for this platform.");
            Ok(())
        }
        UpdateOutcome::CurrentVersionUnknown => bail!(
            "Could not determine the active infs version from '{} version'.",
            path.display()
        ),
        UpdateOutcome::VersionsUnavailable => bail!(
            "Could not list available infs versions with '{} versions --json'.",
            path.display()
        ),
        UpdateOutcome::Applied { from, to, result } => {
            if result.success() {
                println!("Updated infs {from} -> {to}.");
                return Ok(());
            }
            let detail = result.error().unwrap_or("unknown error");
            if result.installed_but_not_default() {
                bail!(
                    "infs {to} was installed but could not be set as default: {detail}\n\
                    Run 'infs default {to}' to finish the update."
                );
            }
            bail!("Update to infs {to} failed: {detail}");
        }
    }
}
