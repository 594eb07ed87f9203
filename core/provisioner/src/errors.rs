//! Error types for the provisioning engine.
//!
//! Every fallible operation in this crate returns [`ProvisionError`]. The
//! variants follow the failure categories a caller has to tell apart:
//! transport failures, protocol violations, integrity failures, manifest
//! problems, extraction problems, subprocess failures and unparseable
//! toolchain output. The install orchestrator wraps the error of the failing
//! step in [`ProvisionError::Stage`] so the caller learns where the pipeline
//! stopped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::install::InstallStage;

/// Result alias used throughout the crate.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

/// Category of a [`ProvisionError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Protocol,
    Integrity,
    Manifest,
    Extraction,
    Process,
    Parse,
    Io,
    UnsupportedPlatform,
    NoMatchingRelease,
    Busy,
}

/// Why a subprocess invocation did not produce a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessFailure {
    /// The program could not be launched at all.
    Spawn,
    /// The program did not finish within its time budget and was killed.
    TimedOut,
    /// The program ran to completion with a non-zero exit code.
    NonZeroExit(i32),
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn => write!(f, "spawn failure"),
            Self::TimedOut => write!(f, "timed out"),
            Self::NonZeroExit(code) => write!(f, "exit {code}"),
        }
    }
}

/// Consolidated error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Connection refused, DNS failure, socket timeout or a broken stream.
    #[error("network error: {message}")]
    Network {
        /// Description of the failed request.
        message: String,
        /// The underlying HTTP client error, when there is one.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Non-2xx status, redirect budget exceeded or an HTTPS-to-HTTP downgrade.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// The downloaded artifact does not hash to the declared digest.
    #[error(
        "SHA-256 verification failed for {}. Expected {expected}, got {actual}.",
        path.display()
    )]
    Integrity {
        /// The artifact that failed verification.
        path: PathBuf,
        /// Digest declared by the manifest.
        expected: String,
        /// Digest computed from the file on disk.
        actual: String,
    },

    /// The manifest is not valid JSON or contains malformed entries.
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of the manifest problem.
        message: String,
    },

    /// Unsupported archive format or a failing unpack tool.
    #[error("extraction error: {message}")]
    Extraction {
        /// Description of the extraction failure.
        message: String,
    },

    /// A subprocess could not be launched, timed out, or exited non-zero.
    #[error("process error: {message}")]
    Process {
        /// Description of the invocation.
        message: String,
        /// What went wrong with the process.
        failure: ProcessFailure,
    },

    /// Output of the toolchain could not be interpreted.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// Local filesystem failure.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The running OS/architecture pair has no published artifacts.
    #[error(
        "unsupported platform: {os} on {arch}. \
         Supported platforms are: linux-x64, macos-arm64, windows-x64"
    )]
    UnsupportedPlatform {
        /// Operating system name.
        os: String,
        /// Architecture name.
        arch: String,
    },

    /// The manifest has no artifact for this platform and channel.
    #[error("no compatible infs release found for {platform} in the {channel} channel")]
    NoMatchingRelease {
        /// Platform identifier.
        platform: String,
        /// Channel name.
        channel: String,
    },

    /// Another operation already holds the provisioner.
    #[error("{operation} cannot start: another toolchain operation is already in progress")]
    Busy {
        /// The operation that was refused.
        operation: &'static str,
    },

    /// Failure of one install pipeline stage.
    #[error("{stage} failed: {source}")]
    Stage {
        /// The stage in which the failure occurred.
        stage: InstallStage,
        /// The error raised by that stage.
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// Creates a new `Network` error without an underlying client error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Network` error wrapping an HTTP client error.
    #[must_use]
    pub fn network_with_source(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a new `Integrity` error.
    #[must_use]
    pub fn integrity(path: &Path, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.to_path_buf(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Manifest` error.
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Creates a new `Extraction` error.
    #[must_use]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Creates a new `Process` error.
    #[must_use]
    pub fn process(message: impl Into<String>, failure: ProcessFailure) -> Self {
        Self::Process {
            message: message.into(),
            failure,
        }
    }

    /// Creates a `Process` error for a program that could not be launched.
    #[must_use]
    pub fn process_spawn(program: &Path, source: &std::io::Error) -> Self {
        Self::process(
            format!("failed to launch {}: {source}", program.display()),
            ProcessFailure::Spawn,
        )
    }

    /// Creates a `Process` error for a program that exceeded its time budget.
    #[must_use]
    pub fn process_timeout(program: &Path, timeout: Duration) -> Self {
        Self::process(
            format!(
                "{} did not finish within {}s",
                program.display(),
                timeout.as_secs()
            ),
            ProcessFailure::TimedOut,
        )
    }

    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new `Io` error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `NoMatchingRelease` error.
    #[must_use]
    pub fn no_matching_release(platform: impl fmt::Display, channel: impl fmt::Display) -> Self {
        Self::NoMatchingRelease {
            platform: platform.to_string(),
            channel: channel.to_string(),
        }
    }

    /// Attributes this error to an install pipeline stage.
    ///
    /// An error that already carries a stage keeps its original attribution.
    #[must_use]
    pub fn at(self, stage: InstallStage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the category of this error, looking through stage wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Manifest { .. } => ErrorKind::Manifest,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Process { .. } => ErrorKind::Process,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Io { .. } => ErrorKind::Io,
            Self::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            Self::NoMatchingRelease { .. } => ErrorKind::NoMatchingRelease,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Stage { source, .. } => source.kind(),
        }
    }

    /// Returns the pipeline stage this error was attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<InstallStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_displays_both_digests() {
        let err = ProvisionError::integrity(Path::new("/tmp/infs.tar.gz"), "abc123", "def456");
        let msg = err.to_string();
        assert!(msg.contains("Expected abc123"));
        assert!(msg.contains("got def456"));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn protocol_displays_message() {
        let err = ProvisionError::protocol("HTTP 404 fetching https://example.com");
        assert_eq!(
            err.to_string(),
            "protocol error: HTTP 404 fetching https://example.com"
        );
    }

    #[test]
    fn stage_wrapper_names_stage_and_keeps_kind() {
        let err = ProvisionError::manifest("invalid JSON").at(InstallStage::FetchingManifest);
        assert_eq!(
            err.to_string(),
            "fetching manifest failed: manifest error: invalid JSON"
        );
        assert_eq!(err.kind(), ErrorKind::Manifest);
        assert_eq!(err.stage(), Some(InstallStage::FetchingManifest));
    }

    #[test]
    fn at_does_not_rewrap_staged_error() {
        let err = ProvisionError::extraction("bad archive")
            .at(InstallStage::Extracting)
            .at(InstallStage::Installing);
        assert_eq!(err.stage(), Some(InstallStage::Extracting));
    }

    #[test]
    fn process_failures_are_distinguishable() {
        let spawn = ProvisionError::process_spawn(
            Path::new("/missing/infs"),
            &std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        let timeout = ProvisionError::process_timeout(Path::new("infs"), Duration::from_secs(30));

        assert!(matches!(
            spawn,
            ProvisionError::Process {
                failure: ProcessFailure::Spawn,
                ..
            }
        ));
        assert!(matches!(
            timeout,
            ProvisionError::Process {
                failure: ProcessFailure::TimedOut,
                ..
            }
        ));
        assert!(timeout.to_string().contains("30s"));
    }

    #[test]
    fn busy_names_operation() {
        let err = ProvisionError::Busy { operation: "update" };
        assert!(err.to_string().starts_with("update cannot start"));
        assert_eq!(err.kind(), ErrorKind::Busy);
    }
}
