//! Install, update and version-selection orchestration.
//!
//! A fresh install runs strictly in sequence:
//!
//! ```text
//! FetchingManifest -> Downloading -> Verifying -> Extracting -> Installing -> VerifyingInstall
//! ```
//!
//! Any stage failure ends the operation with a [`ProvisionError::Stage`]
//! naming the stage. The only exception is the final self-check: a failing
//! or unlaunchable `infs doctor` sets [`InstallResult::doctor_warnings`]
//! instead of failing an install that has already succeeded.
//!
//! Install, update and version selection share one in-process
//! "operation in progress" flag. A second operation started while the flag
//! is held fails with [`ProvisionError::Busy`].

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tracing::{info, warn};

use crate::archive::{Extractor, SystemExtractor, extract_archive};
use crate::config::ProvisionConfig;
use crate::detection::detect_infs;
use crate::doctor::{DoctorResult, run_doctor};
use crate::download::Downloader;
use crate::errors::{ProcessFailure, ProvisionError, Result};
use crate::exec::{CommandRunner, TokioRunner};
use crate::manifest::{ReleaseMatch, fetch_manifest, resolve_release};
use crate::platform::PlatformInfo;
use crate::verify::verify_checksum;
use crate::version::{compare_versions, sort_newest_first};
use crate::versions::{
    Compatibility, SwitchResult, VersionInfo, check_compatibility, current_version,
    fetch_versions, switch_version,
};

/// A stage of the install pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStage {
    FetchingManifest,
    Downloading,
    /// Checksum verification of the downloaded archive.
    Verifying,
    Extracting,
    Installing,
    /// The `infs doctor` self-check.
    VerifyingInstall,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FetchingManifest => "fetching manifest",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying checksum",
            Self::Extracting => "extracting",
            Self::Installing => "installing",
            Self::VerifyingInstall => "verifying installation",
        })
    }
}

/// Progress event emitted by [`Provisioner::install`].
///
/// Checksum verification emits no event of its own; it is reported as part
/// of the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallProgress {
    FetchingManifest {
        message: String,
    },
    Downloading {
        message: String,
        bytes_received: u64,
        /// `Content-Length` of the artifact, when the server sent one.
        bytes_total: Option<u64>,
    },
    Extracting {
        message: String,
    },
    Installing {
        message: String,
    },
    Verifying {
        message: String,
    },
}

impl InstallProgress {
    /// Human-readable description of the current step.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::FetchingManifest { message }
            | Self::Downloading { message, .. }
            | Self::Extracting { message }
            | Self::Installing { message }
            | Self::Verifying { message } => message,
        }
    }

    /// The pipeline stage this event belongs to.
    #[must_use]
    pub fn stage(&self) -> InstallStage {
        match self {
            Self::FetchingManifest { .. } => InstallStage::FetchingManifest,
            Self::Downloading { .. } => InstallStage::Downloading,
            Self::Extracting { .. } => InstallStage::Extracting,
            Self::Installing { .. } => InstallStage::Installing,
            Self::Verifying { .. } => InstallStage::VerifyingInstall,
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    /// Path of the extracted `infs` binary.
    pub binary_path: PathBuf,
    /// Version that was installed.
    pub version: String,
    /// Set when `infs doctor` failed or could not be run.
    pub doctor_warnings: bool,
}

/// Result of comparing the active version against the installable ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// `infs version` failed or printed something unrecognizable.
    CurrentVersionUnknown,
    /// `infs versions --json` failed.
    VersionsUnavailable,
    /// No version is available for this platform.
    NoCandidates,
    UpToDate { current: String },
    Available { current: String, latest: String },
}

/// Outcome of [`Provisioner::update`].
///
/// Every variant but `Applied` means no switch was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// `infs version` failed or printed something unrecognizable.
    CurrentVersionUnknown,
    /// `infs versions --json` failed.
    VersionsUnavailable,
    /// No version is available for this platform.
    NoCandidates,
    UpToDate { current: String },
    Applied {
        from: String,
        to: String,
        result: SwitchResult,
    },
}

/// Outcome of [`Provisioner::select_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The requested version is already the default; nothing was run.
    AlreadyCurrent,
    Switched(SwitchResult),
}

/// A version offered for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectableVersion {
    pub info: VersionInfo,
    /// Whether this is the active version.
    pub current: bool,
}

/// Clears the operation flag when dropped.
struct OperationGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, AtomicOrdering::Release);
    }
}

/// Drives toolchain installation and version management.
pub struct Provisioner<R = TokioRunner, E = SystemExtractor> {
    config: ProvisionConfig,
    platform: PlatformInfo,
    downloader: Downloader,
    runner: R,
    extractor: E,
    busy: AtomicBool,
}

impl Provisioner {
    /// Creates a provisioner for the running platform using subprocesses
    /// and the system archive tools.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] on platforms without
    /// published artifacts and [`ProvisionError::Network`] if the HTTP
    /// client cannot be built.
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        let platform = PlatformInfo::current()?;
        Self::with_parts(config, platform, TokioRunner, SystemExtractor)
    }
}

impl<R: CommandRunner, E: Extractor> Provisioner<R, E> {
    /// Creates a provisioner from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Network`] if the HTTP client cannot be
    /// built.
    pub fn with_parts(
        config: ProvisionConfig,
        platform: PlatformInfo,
        runner: R,
        extractor: E,
    ) -> Result<Self> {
        let downloader = Downloader::new(config.socket_timeout)?;
        Ok(Self {
            config,
            platform,
            downloader,
            runner,
            extractor,
            busy: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    fn begin(&self, operation: &'static str) -> Result<OperationGuard<'_>> {
        self.busy
            .compare_exchange(
                false,
                true,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .map_err(|_| ProvisionError::Busy { operation })?;
        Ok(OperationGuard { busy: &self.busy })
    }

    /// Locates an installed `infs` binary.
    #[must_use]
    pub fn detect_binary(&self) -> Option<PathBuf> {
        detect_infs(&self.config, &self.platform)
    }

    /// Runs `infs doctor` and parses its report.
    pub async fn doctor(&self, infs_path: &Path) -> Option<DoctorResult> {
        run_doctor(&self.runner, infs_path, self.config.doctor_timeout).await
    }

    /// Downloads, verifies and installs the newest release of the configured
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Busy`] if another operation is running, and
    /// otherwise a [`ProvisionError::Stage`] wrapping the failure of the
    /// first stage that failed.
    pub async fn install<F>(&self, on_progress: F) -> Result<InstallResult>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        let _guard = self.begin("install")?;

        on_progress(InstallProgress::FetchingManifest {
            message: "Fetching release manifest...".to_string(),
        });
        let releases = fetch_manifest(&self.downloader, &self.config.manifest_url)
            .await
            .map_err(|e| e.at(InstallStage::FetchingManifest))?;
        let release = resolve_release(&releases, self.platform.id, self.config.channel)
            .ok_or_else(|| {
                ProvisionError::no_matching_release(self.platform.id, self.config.channel)
                    .at(InstallStage::FetchingManifest)
            })?;
        let version = release.release.version.clone();
        info!(version, url = release.file_url, "resolved release");

        let archive_path = self.download_release(&release, &on_progress).await?;

        let outcome = self
            .unpack_release(&release, &archive_path, &on_progress)
            .await;
        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            warn!(path = %archive_path.display(), error = %e, "could not remove downloaded archive");
        }
        let binary_path = outcome?;

        on_progress(InstallProgress::Installing {
            message: "Running infs install...".to_string(),
        });
        let output = self
            .runner
            .run(&binary_path, &["install"], self.config.install_timeout)
            .await
            .map_err(|e| e.at(InstallStage::Installing))?;
        if !output.success() {
            return Err(ProvisionError::process(
                format!(
                    "infs install failed (exit {}): {}",
                    output.exit_code,
                    output.failure_detail()
                ),
                ProcessFailure::NonZeroExit(output.exit_code),
            )
            .at(InstallStage::Installing));
        }

        on_progress(InstallProgress::Verifying {
            message: "Verifying installation...".to_string(),
        });
        let doctor_warnings = match self
            .runner
            .run(&binary_path, &["doctor"], self.config.doctor_timeout)
            .await
        {
            Ok(output) if output.success() => false,
            Ok(output) => {
                warn!(exit_code = output.exit_code, "infs doctor reported problems");
                true
            }
            Err(e) => {
                warn!(error = %e, "infs doctor could not be run");
                true
            }
        };

        info!(version, path = %binary_path.display(), doctor_warnings, "toolchain installed");
        Ok(InstallResult {
            binary_path,
            version,
            doctor_warnings,
        })
    }

    async fn download_release<F>(&self, release: &ReleaseMatch, on_progress: &F) -> Result<PathBuf>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        let downloads = self.config.downloads_dir();
        tokio::fs::create_dir_all(&downloads).await.map_err(|e| {
            ProvisionError::io(
                format!("Failed to create directory: {}", downloads.display()),
                e,
            )
            .at(InstallStage::Downloading)
        })?;
        let archive_path = downloads.join(self.platform.archive_name());

        let message = format!("Downloading infs v{}...", release.release.version);
        on_progress(InstallProgress::Downloading {
            message: message.clone(),
            bytes_received: 0,
            bytes_total: None,
        });
        let report = |bytes_received: u64, bytes_total: Option<u64>| {
            on_progress(InstallProgress::Downloading {
                message: message.clone(),
                bytes_received,
                bytes_total,
            });
        };

        self.downloader
            .download_file(&release.file_url, &archive_path, Some(&report))
            .await
            .map_err(|e| e.at(InstallStage::Downloading))?;
        Ok(archive_path)
    }

    /// Verifies and extracts the archive; returns the extracted binary.
    async fn unpack_release<F>(
        &self,
        release: &ReleaseMatch,
        archive_path: &Path,
        on_progress: &F,
    ) -> Result<PathBuf>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        verify_checksum(archive_path, &release.sha256)
            .await
            .map_err(|e| e.at(InstallStage::Verifying))?;

        on_progress(InstallProgress::Extracting {
            message: "Extracting archive...".to_string(),
        });
        let bin_dir = self.config.bin_dir();
        extract_archive(&self.extractor, archive_path, &bin_dir)
            .await
            .map_err(|e| e.at(InstallStage::Extracting))?;

        let binary_path = bin_dir.join(self.platform.binary_name);
        if !tokio::fs::try_exists(&binary_path).await.unwrap_or(false) {
            return Err(ProvisionError::extraction(format!(
                "infs binary not found at {} after extraction.",
                binary_path.display()
            ))
            .at(InstallStage::Extracting));
        }
        Ok(binary_path)
    }

    /// Compares the active version of `infs_path` against the versions it
    /// can install for this platform.
    pub async fn check_for_update(&self, infs_path: &Path) -> UpdateCheck {
        let timeout = self.config.command_timeout;
        let Some(current) = current_version(&self.runner, infs_path, timeout).await else {
            return UpdateCheck::CurrentVersionUnknown;
        };
        let Some(versions) = fetch_versions(&self.runner, infs_path, timeout).await else {
            return UpdateCheck::VersionsUnavailable;
        };

        let mut candidates: Vec<VersionInfo> = versions
            .into_iter()
            .filter(|v| v.available_for_current)
            .collect();
        sort_newest_first(&mut candidates, |v| v.version.as_str());

        match candidates.into_iter().next() {
            None => UpdateCheck::NoCandidates,
            Some(latest) if compare_versions(&current, &latest.version) == Ordering::Less => {
                UpdateCheck::Available {
                    current,
                    latest: latest.version,
                }
            }
            Some(_) => UpdateCheck::UpToDate { current },
        }
    }

    /// Checks that `infs_path` is at least the minimum supported version.
    pub async fn check_compatibility(&self, infs_path: &Path) -> Compatibility {
        check_compatibility(&self.runner, infs_path, self.config.command_timeout).await
    }

    /// Switches to the newest installable version if it is newer than the
    /// active one.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Busy`] if another operation is running.
    /// Failures of the switch itself are reported in the returned
    /// [`SwitchResult`].
    pub async fn update(&self, infs_path: &Path) -> Result<UpdateOutcome> {
        let _guard = self.begin("update")?;

        let outcome = match self.check_for_update(infs_path).await {
            UpdateCheck::Available { current, latest } => {
                info!(from = current, to = latest, "updating toolchain");
                let result = self.switch(infs_path, &latest).await;
                UpdateOutcome::Applied {
                    from: current,
                    to: latest,
                    result,
                }
            }
            UpdateCheck::CurrentVersionUnknown => UpdateOutcome::CurrentVersionUnknown,
            UpdateCheck::VersionsUnavailable => UpdateOutcome::VersionsUnavailable,
            UpdateCheck::NoCandidates => UpdateOutcome::NoCandidates,
            UpdateCheck::UpToDate { current } => UpdateOutcome::UpToDate { current },
        };
        Ok(outcome)
    }

    /// Lists the versions available for this platform, newest first, with
    /// the active version moved to the front.
    ///
    /// Returns `None` if `infs versions --json` fails.
    pub async fn selectable_versions(&self, infs_path: &Path) -> Option<Vec<SelectableVersion>> {
        let timeout = self.config.command_timeout;
        let current = current_version(&self.runner, infs_path, timeout).await;
        let mut versions: Vec<VersionInfo> = fetch_versions(&self.runner, infs_path, timeout)
            .await?
            .into_iter()
            .filter(|v| v.available_for_current)
            .collect();
        sort_newest_first(&mut versions, |v| v.version.as_str());

        let mut items: Vec<SelectableVersion> = versions
            .into_iter()
            .map(|info| SelectableVersion {
                current: current.as_deref() == Some(info.version.as_str()),
                info,
            })
            .collect();
        if let Some(index) = items.iter().position(|item| item.current) {
            let item = items.remove(index);
            items.insert(0, item);
        }
        Some(items)
    }

    /// Makes `version` the default, installing it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Busy`] if another operation is running.
    pub async fn select_version(&self, infs_path: &Path, version: &str) -> Result<SelectOutcome> {
        let _guard = self.begin("select version")?;

        let current = current_version(&self.runner, infs_path, self.config.command_timeout).await;
        if current.as_deref() == Some(version) {
            return Ok(SelectOutcome::AlreadyCurrent);
        }
        Ok(SelectOutcome::Switched(self.switch(infs_path, version).await))
    }

    async fn switch(&self, infs_path: &Path, version: &str) -> SwitchResult {
        switch_version(
            &self.runner,
            infs_path,
            version,
            self.config.install_timeout,
            self.config.command_timeout,
        )
        .await
    }
}
