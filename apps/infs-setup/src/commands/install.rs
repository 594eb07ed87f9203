//! Install command for the infs-setup CLI.
//!
//! Downloads and installs the newest toolchain release of the configured
//! channel.
//!
//! ## Usage
//!
//! ```bash
//! infs-setup install                   # Latest stable release
//! infs-setup --channel latest install  # Include pre-releases
//! ```

use std::io::Write;
use std::sync::Mutex;

use anyhow::Result;
use inference_provisioner::{InstallProgress, InstallStage, Provisioner};

/// Executes the install command.
///
/// Prints one line per pipeline stage and a running byte count while
/// downloading.
///
/// # Errors
///
/// Returns an error naming the failed stage if any stage fails.
pub async fn execute(provisioner: &Provisioner) -> Result<()> {
    let last_stage: Mutex<Option<InstallStage>> = Mutex::new(None);

    let result = provisioner
        .install(|progress| {
            let Ok(mut last) = last_stage.lock() else {
                return;
            };
            report_progress(&progress, last.replace(progress.stage()));
        })
        .await?;

    println!(
        "infs {} installed at {}",
        result.version,
        result.binary_path.display()
    );
    if result.doctor_warnings {
        println!();
        println!("Warning: the installation self-check reported problems.");
        println!("Run 'infs-setup doctor' for details.");
    }
    Ok(())
}

fn report_progress(progress: &InstallProgress, previous: Option<InstallStage>) {
    let new_stage = previous != Some(progress.stage());
    if new_stage && previous == Some(InstallStage::Downloading) {
        eprintln!();
    }

    match progress {
        InstallProgress::Downloading {
            message,
            bytes_received,
            bytes_total,
        } => {
            let line = match bytes_total {
                Some(total) if *total > 0 => {
                    format!("{message} {bytes_received}/{total} bytes")
                }
                _ => format!("{message} {bytes_received} bytes"),
            };
            eprint!("\r{line}");
            let _ = std::io::stderr().flush();
        }
        other if new_stage => eprintln!("{}", other.message()),
        _ => {}
    }
}
