//! Doctor command for the infs-setup CLI.
//!
//! Runs `infs doctor` on the detected binary and prints the parsed report.
//!
//! ## Output Format
//!
//! ```text
//! --- Doctor Report ---
//!   [OK]   Platform: linux-x64
//!   [WARN] Default toolchain: No default toolchain set.
//!
//! 1 warning.
//! ---------------------
//! ```

use anyhow::{Context, Result};
use inference_provisioner::Provisioner;

use super::require_binary;

/// Executes the doctor command.
///
/// Failing checks are reported, not turned into an error.
///
/// # Errors
///
/// Returns an error if no infs binary is found or `infs doctor` cannot be
/// run.
pub async fn execute(provisioner: &Provisioner) -> Result<()> {
    let path = require_binary(provisioner)?;
    let report = provisioner
        .doctor(&path)
        .await
        .with_context(|| format!("Failed to run {} doctor", path.display()))?;

    println!("{report}");
    if report.has_errors() {
        println!();
        println!("Some checks failed. See the report above for details.");
    }
    Ok(())
}
