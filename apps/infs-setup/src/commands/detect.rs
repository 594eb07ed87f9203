//! Detect command for the infs-setup CLI.
//!
//! Prints the path of the `infs` binary that the other commands would use,
//! followed by whether its version meets the supported minimum.

use anyhow::Result;
use inference_provisioner::{Compatibility, Provisioner};

use super::require_binary;

/// Executes the detect command.
///
/// An outdated or unrecognizable version is reported on stderr but does not
/// fail the command.
///
/// # Errors
///
/// Returns an error if no infs binary can be found.
pub async fn execute(provisioner: &Provisioner) -> Result<()> {
    let path = require_binary(provisioner)?;
    println!("{}", path.display());

    match provisioner.check_compatibility(&path).await {
        Compatibility::Compatible { version } => println!("infs {version}"),
        Compatibility::Outdated { version, minimum } => {
            eprintln!(
                "Warning: infs {version} is outdated (minimum: {minimum}). \
                Run 'infs-setup update' to upgrade."
            );
        }
        Compatibility::Unknown => {
            eprintln!("Warning: could not determine the infs version.");
        }
    }
    Ok(())
}
