//! Bounded subprocess invocation.
//!
//! Every call to the toolchain binary goes through [`CommandRunner`]. The
//! production implementation, [`TokioRunner`], launches the program directly
//! (no shell), captures both output streams in full and kills the child if it
//! outlives its timeout.

use std::ffi::OsStr;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{ProvisionError, Result};

/// Default timeout for short toolchain commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; a process killed by a signal reports `1`.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Returns whether the process exited with code `0`.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the text that best describes a failure: trimmed stderr, or
    /// trimmed stdout when stderr is blank.
    #[must_use]
    pub fn failure_detail(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs external programs.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// A non-zero exit is reported through [`ExecOutput::exit_code`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Process`] if the program cannot be launched
    /// or does not exit within `timeout`.
    fn run(
        &self,
        program: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExecOutput>> + Send;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl CommandRunner for TokioRunner {
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<ExecOutput> {
        let mut command = Command::new(program);
        command.args(args);
        run_command(command, program, timeout).await
    }
}

/// Spawns a prepared command with null stdin and piped output, enforcing
/// `timeout`.
///
/// `label` names the program in error messages.
pub(crate) async fn run_command(
    mut command: Command,
    label: &Path,
    timeout: Duration,
) -> Result<ExecOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %label.display(), ?timeout, "spawning");
    let child = command
        .spawn()
        .map_err(|e| ProvisionError::process_spawn(label, &e))?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProvisionError::process_timeout(label, timeout))?
        .map_err(|e| {
            ProvisionError::io(
                format!("Failed to collect output of {}", label.display()),
                e,
            )
        })?;

    let exit_code = output.status.code().unwrap_or(1);
    debug!(program = %label.display(), exit_code, "process exited");

    Ok(ExecOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Builds a command for `program` with OS-string arguments.
pub(crate) fn command_with_args<I, S>(program: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    command
}
