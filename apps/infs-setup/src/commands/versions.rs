//! Versions command for the infs-setup CLI.
//!
//! Lists the versions the installed toolchain can install for this
//! platform, newest first, with the active version at the top.
//!
//! ## Output Format
//!
//! ```text
//! Available toolchain versions:
//!
//!   0.2.0 (stable) [current]
//!   0.3.0-alpha (prerelease)
//!   0.1.0 (stable)
//! ```

use anyhow::{Context, Result};
use clap::Args;
use inference_provisioner::{Provisioner, SelectableVersion};
use serde::Serialize;

use super::require_binary;

/// Arguments for the versions command.
#[derive(Args)]
pub struct VersionsArgs {
    /// Show versions in JSON format.
    #[clap(long, short = 'j')]
    pub json: bool,
}

/// Version entry for JSON output.
#[derive(Serialize)]
struct VersionEntry<'a> {
    version: &'a str,
    stable: bool,
    current: bool,
}

/// Executes the versions command.
///
/// # Errors
///
/// Returns an error if no infs binary is found or it cannot list versions.
pub async fn execute(provisioner: &Provisioner, args: &VersionsArgs) -> Result<()> {
    let path = require_binary(provisioner)?;
    let items = provisioner
        .selectable_versions(&path)
        .await
        .with_context(|| format!("Failed to list versions with {}", path.display()))?;

    if args.json {
        output_json(&items)
    } else {
        output_text(&items);
        Ok(())
    }
}

fn output_json(items: &[SelectableVersion]) -> Result<()> {
    let entries: Vec<VersionEntry<'_>> = items
        .iter()
        .map(|item| VersionEntry {
            version: &item.info.version,
            stable: item.info.stable,
            current: item.current,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn output_text(items: &[SelectableVersion]) {
    if items.is_empty() {
        println!("No versions available for this platform.");
        return;
    }

    println!("Available toolchain versions:");
    println!();
    for item in items {
        let stability = if item.info.stable {
            "stable"
        } else {
            "prerelease"
        };
        let marker = if item.current { " [current]" } else { "" };
        println!("  {} ({stability}){marker}", item.info.version);
    }
}
