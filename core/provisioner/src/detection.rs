//! Locating an `infs` binary.
//!
//! Search order:
//!
//! 1. The explicit override (`INFS_PATH`). When set, it is the only
//!    candidate: a missing or non-executable file means "not found".
//! 2. The system `PATH`, via `which`.
//! 3. The managed location, `<inference_home>/bin/infs`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ProvisionConfig;
use crate::platform::PlatformInfo;

/// Locates the `infs` binary for `platform`.
#[must_use]
pub fn detect_infs(config: &ProvisionConfig, platform: &PlatformInfo) -> Option<PathBuf> {
    detect_in(config, platform, std::env::var_os("PATH"))
}

fn detect_in(
    config: &ProvisionConfig,
    platform: &PlatformInfo,
    search_path: Option<OsString>,
) -> Option<PathBuf> {
    if let Some(path) = &config.binary_override {
        let found = is_executable(path);
        debug!(path = %path.display(), found, "checked explicit infs path");
        return found.then(|| path.clone());
    }

    if let Some(search_path) = search_path {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if let Ok(path) = which::which_in(platform.binary_name, Some(search_path), cwd) {
            debug!(path = %path.display(), "found infs on PATH");
            return Some(path);
        }
    }

    let managed = config.bin_dir().join(platform.binary_name);
    if is_executable(&managed) {
        debug!(path = %managed.display(), "found managed infs");
        return Some(managed);
    }

    None
}

/// Returns whether `path` is a file the current user may execute.
#[cfg(unix)]
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// Returns whether `path` is a file the current user may execute.
#[cfg(not(unix))]
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
