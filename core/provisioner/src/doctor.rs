//! Parsing of the toolchain's `doctor` self-check report.
//!
//! `infs doctor` prints one line per check:
//!
//! ```text
//!   [OK]   Platform: linux-x64
//!   [WARN] Default toolchain: No default toolchain set.
//!          Run 'infs default 0.2.0' to set one.
//!   [FAIL] inf-llc: not found
//!
//! 1 error, 1 warning.
//! ```
//!
//! Indented continuation lines belong to the check above them and are not
//! checks of their own. The summary is the last non-blank line that is not a
//! check line.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::exec::CommandRunner;

/// Status of a doctor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoctorCheckStatus {
    /// Check passed.
    Ok,
    /// Check passed with warnings.
    Warn,
    /// Check failed.
    Fail,
}

impl DoctorCheckStatus {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "OK" => Some(Self::Ok),
            "WARN" => Some(Self::Warn),
            "FAIL" => Some(Self::Fail),
            _ => None,
        }
    }

    /// Returns the fixed-width report tag for this status.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Ok => "[OK]  ",
            Self::Warn => "[WARN]",
            Self::Fail => "[FAIL]",
        }
    }
}

/// Result of a single doctor check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorCheck {
    /// Name of the check.
    pub name: String,
    /// Status of the check.
    pub status: DoctorCheckStatus,
    /// Descriptive message.
    pub message: String,
}

impl DoctorCheck {
    /// Parses a single check line, or returns `None` if `line` is not one.
    fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix('[')?;
        let (keyword, rest) = rest.split_once(']')?;
        let status = DoctorCheckStatus::from_keyword(keyword)?;

        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let rest = rest.trim_start();

        let separator = rest
            .char_indices()
            .skip(1)
            .find(|&(i, c)| c == ':' && rest[i + 1..].starts_with(char::is_whitespace))
            .map(|(i, _)| i)?;

        Some(Self {
            name: rest[..separator].to_string(),
            status,
            message: rest[separator + 1..].trim().to_string(),
        })
    }
}

/// Structured form of a doctor report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctorResult {
    /// Checks in output order.
    pub checks: Vec<DoctorCheck>,
    /// Last non-blank, non-check line, trimmed; empty if there is none.
    pub summary: String,
}

impl DoctorResult {
    /// Parses the raw output of `infs doctor`.
    ///
    /// Never fails: unrecognized lines are ignored and empty input yields
    /// an empty report.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut checks = Vec::new();
        let mut summary = "";

        for line in output.lines() {
            if let Some(check) = DoctorCheck::parse_line(line) {
                checks.push(check);
            } else if !line.trim().is_empty() {
                summary = line.trim();
            }
        }

        Self {
            checks,
            summary: summary.to_string(),
        }
    }

    /// Returns whether any check failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.status == DoctorCheckStatus::Fail)
    }

    /// Returns whether any check produced a warning.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.status == DoctorCheckStatus::Warn)
    }
}

impl fmt::Display for DoctorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Doctor Report ---")?;
        for check in &self.checks {
            writeln!(
                f,
                "  {} {}: {}",
                check.status.prefix(),
                check.name,
                check.message
            )?;
        }
        if !self.summary.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", self.summary)?;
        }
        write!(f, "---------------------")
    }
}

/// Runs `doctor` on the binary at `infs_path` and parses its stdout.
///
/// The report is parsed whatever the exit code; a failing self-check still
/// prints its checks. Returns `None` if the process cannot be run.
pub async fn run_doctor<R: CommandRunner>(
    runner: &R,
    infs_path: &Path,
    timeout: Duration,
) -> Option<DoctorResult> {
    match runner.run(infs_path, &["doctor"], timeout).await {
        Ok(output) => Some(DoctorResult::parse(&output.stdout)),
        Err(e) => {
            warn!(path = %infs_path.display(), error = %e, "doctor could not be run");
            None
        }
    }
}
