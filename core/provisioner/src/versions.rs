//! Version queries and version switching through the installed toolchain.
//!
//! The toolchain owns its installed versions and the default-version
//! pointer. This module only drives its `version`, `versions --json`,
//! `install <version>` and `default <version>` subcommands and interprets
//! their output.

use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::{ProvisionError, Result};
use crate::exec::CommandRunner;
use crate::version::compare_versions;

/// A version as reported by `infs versions --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Whether the version has an artifact for the running platform.
    #[serde(default)]
    pub available_for_current: bool,
}

/// Outcome of a version switch.
///
/// `installed_but_not_default` is only ever set on a failed switch whose
/// install half succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchResult {
    success: bool,
    installed_but_not_default: bool,
    error: Option<String>,
}

impl SwitchResult {
    /// The version was installed and made the default.
    #[must_use]
    pub fn switched() -> Self {
        Self {
            success: true,
            installed_but_not_default: false,
            error: None,
        }
    }

    /// `install <version>` failed; nothing changed.
    #[must_use]
    pub fn install_failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            installed_but_not_default: false,
            error: Some(error.into()),
        }
    }

    /// The version is installed but `default <version>` failed.
    #[must_use]
    pub fn default_failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            installed_but_not_default: true,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn installed_but_not_default(&self) -> bool {
        self.installed_but_not_default
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Extracts the version from `infs version` output (`infs 0.2.0`).
#[must_use]
pub fn parse_current_version(stdout: &str) -> Option<String> {
    let rest = stdout.strip_prefix("infs")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next().map(str::to_string)
}

/// Parses `infs versions --json` output.
///
/// Array elements that do not describe a version are skipped.
///
/// # Errors
///
/// Returns [`ProvisionError::Parse`] if the output is not JSON or not an
/// array.
pub fn parse_versions_json(stdout: &str) -> Result<Vec<VersionInfo>> {
    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| ProvisionError::parse(format!("versions output is not JSON: {e}")))?;
    let Value::Array(entries) = value else {
        return Err(ProvisionError::parse("versions output is not a JSON array"));
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<VersionInfo>(entry) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "skipping malformed versions entry");
                None
            }
        })
        .collect())
}

/// Lenient form of [`parse_versions_json`]: unparseable output is an empty
/// list.
#[must_use]
pub fn parse_versions_output(stdout: &str) -> Vec<VersionInfo> {
    parse_versions_json(stdout).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unparseable versions output");
        Vec::new()
    })
}

/// Reads the active version with `infs version`.
///
/// Returns `None` if the command cannot run, exits non-zero, or prints
/// something unrecognizable.
pub async fn current_version<R: CommandRunner>(
    runner: &R,
    infs_path: &Path,
    timeout: Duration,
) -> Option<String> {
    match runner.run(infs_path, &["version"], timeout).await {
        Ok(output) if output.success() => parse_current_version(output.stdout.trim()),
        Ok(output) => {
            warn!(exit_code = output.exit_code, "infs version failed");
            None
        }
        Err(e) => {
            warn!(error = %e, "infs version could not be run");
            None
        }
    }
}

/// Oldest `infs` release the provisioner can drive.
pub const MIN_INFS_VERSION: &str = "0.1.0";

/// Whether an installed `infs` is new enough to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible { version: String },
    Outdated { version: String, minimum: &'static str },
    /// `infs version` failed or printed something unrecognizable.
    Unknown,
}

/// Returns `true` if `version` is at least [`MIN_INFS_VERSION`].
#[must_use]
pub fn meets_minimum(version: &str) -> bool {
    compare_versions(version, MIN_INFS_VERSION) != Ordering::Less
}

/// Checks the active version of `infs_path` against [`MIN_INFS_VERSION`].
pub async fn check_compatibility<R: CommandRunner>(
    runner: &R,
    infs_path: &Path,
    timeout: Duration,
) -> Compatibility {
    match current_version(runner, infs_path, timeout).await {
        Some(version) if meets_minimum(&version) => Compatibility::Compatible { version },
        Some(version) => {
            warn!(
                version = %version,
                minimum = MIN_INFS_VERSION,
                "infs is older than the minimum supported version"
            );
            Compatibility::Outdated {
                version,
                minimum: MIN_INFS_VERSION,
            }
        }
        None => Compatibility::Unknown,
    }
}

/// Lists installable versions with `infs versions --json`.
///
/// Returns `None` if the command cannot run or exits non-zero. Unparseable
/// output yields an empty list.
pub async fn fetch_versions<R: CommandRunner>(
    runner: &R,
    infs_path: &Path,
    timeout: Duration,
) -> Option<Vec<VersionInfo>> {
    match runner.run(infs_path, &["versions", "--json"], timeout).await {
        Ok(output) if output.success() => Some(parse_versions_output(&output.stdout)),
        Ok(output) => {
            warn!(exit_code = output.exit_code, "infs versions failed");
            None
        }
        Err(e) => {
            warn!(error = %e, "infs versions could not be run");
            None
        }
    }
}

/// Installs `version` and makes it the default.
///
/// `default` runs only after `install` succeeded.
pub async fn switch_version<R: CommandRunner>(
    runner: &R,
    infs_path: &Path,
    version: &str,
    install_timeout: Duration,
    command_timeout: Duration,
) -> SwitchResult {
    match runner
        .run(infs_path, &["install", version], install_timeout)
        .await
    {
        Ok(output) if output.success() => {}
        Ok(output) => return SwitchResult::install_failed(output.failure_detail()),
        Err(e) => return SwitchResult::install_failed(e.to_string()),
    }

    match runner
        .run(infs_path, &["default", version], command_timeout)
        .await
    {
        Ok(output) if output.success() => {
            info!(version, "default toolchain switched");
            SwitchResult::switched()
        }
        Ok(output) => SwitchResult::default_failed(output.failure_detail()),
        Err(e) => SwitchResult::default_failed(e.to_string()),
    }
}
