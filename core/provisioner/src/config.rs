//! Provisioning configuration.
//!
//! Defaults can be overridden through the environment:
//!
//! - `INFERENCE_HOME`: toolchain root (default `~/.inference`)
//! - `INFS_DIST_SERVER`: distribution server; `/releases.json` is appended
//! - `INFS_CHANNEL`: `stable` or `latest`
//! - `INFS_PATH`: explicit path to the `infs` binary
//!
//! Empty or whitespace-only values are treated as unset.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.inference/        # Root directory (or INFERENCE_HOME)
//!   bin/               # Extracted toolchain binary
//!   downloads/         # Release archives while they are being installed
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::download::DEFAULT_SOCKET_TIMEOUT;
use crate::errors::{ProvisionError, Result};
use crate::exec::DEFAULT_COMMAND_TIMEOUT;
use crate::manifest::Channel;

/// Environment variable to override the default toolchain root directory.
pub const INFERENCE_HOME_ENV: &str = "INFERENCE_HOME";

/// Environment variable to override the distribution server.
pub const DIST_SERVER_ENV: &str = "INFS_DIST_SERVER";

/// Environment variable selecting the release channel.
pub const CHANNEL_ENV: &str = "INFS_CHANNEL";

/// Environment variable pointing at an explicit `infs` binary.
pub const INFS_PATH_ENV: &str = "INFS_PATH";

/// Default distribution server.
pub const DEFAULT_DIST_SERVER: &str = "https://inference-lang.org";

/// Path of the release manifest on the distribution server.
pub const RELEASES_PATH: &str = "/releases.json";

/// Timeout for `infs install`.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `infs doctor`.
pub const DEFAULT_DOCTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every provisioning operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Toolchain root directory.
    pub inference_home: PathBuf,
    /// Full URL of the release manifest.
    pub manifest_url: String,
    pub channel: Channel,
    /// Explicit `infs` binary; when set, detection looks nowhere else.
    pub binary_override: Option<PathBuf>,
    /// Connect timeout and maximum silence while a body streams.
    pub socket_timeout: Duration,
    pub install_timeout: Duration,
    pub doctor_timeout: Duration,
    /// Timeout for `version`, `versions` and `default`.
    pub command_timeout: Duration,
}

impl ProvisionConfig {
    /// Creates a configuration rooted at `inference_home` with all other
    /// settings at their defaults.
    #[must_use]
    pub fn with_home(inference_home: PathBuf) -> Self {
        Self {
            inference_home,
            manifest_url: releases_url(DEFAULT_DIST_SERVER),
            channel: Channel::default(),
            binary_override: None,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            doctor_timeout: DEFAULT_DOCTOR_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Reads the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Io`] if `INFERENCE_HOME` is unset and the
    /// user's home directory cannot be determined.
    pub fn from_env() -> Result<Self> {
        let inference_home = match env_value(INFERENCE_HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => default_home()?,
        };

        let mut config = Self::with_home(inference_home);
        if let Some(server) = env_value(DIST_SERVER_ENV) {
            config.manifest_url = releases_url(&server);
        }
        if let Some(channel) = env_value(CHANNEL_ENV) {
            config.channel = Channel::from_setting(&channel);
        }
        config.binary_override = env_value(INFS_PATH_ENV).map(PathBuf::from);
        Ok(config)
    }

    /// Directory the toolchain binary is extracted into.
    #[must_use = "returns the path without side effects"]
    pub fn bin_dir(&self) -> PathBuf {
        self.inference_home.join("bin")
    }

    /// Directory release archives are downloaded into.
    #[must_use = "returns the path without side effects"]
    pub fn downloads_dir(&self) -> PathBuf {
        self.inference_home.join("downloads")
    }
}

/// Builds the manifest URL for a distribution server root.
#[must_use]
pub fn releases_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    format!("{server}{RELEASES_PATH}")
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(windows)]
fn default_home() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("inference"))
        .ok_or_else(no_home_dir)
}

#[cfg(not(windows))]
fn default_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|dir| dir.join(".inference"))
        .ok_or_else(no_home_dir)
}

fn no_home_dir() -> ProvisionError {
    ProvisionError::io(
        "Cannot determine home directory. Set INFERENCE_HOME environment variable.",
        std::io::Error::from(std::io::ErrorKind::NotFound),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for name in [INFERENCE_HOME_ENV, DIST_SERVER_ENV, CHANNEL_ENV, INFS_PATH_ENV] {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn releases_url_handles_trailing_slash() {
        assert_eq!(
            releases_url("http://localhost:8080/"),
            "http://localhost:8080/releases.json"
        );
        assert_eq!(
            releases_url(DEFAULT_DIST_SERVER),
            "https://inference-lang.org/releases.json"
        );
    }

    #[test]
    fn with_home_uses_defaults() {
        let config = ProvisionConfig::with_home(PathBuf::from("/opt/inference"));
        assert_eq!(config.channel, Channel::Stable);
        assert_eq!(config.socket_timeout, Duration::from_secs(15));
        assert_eq!(config.install_timeout, Duration::from_secs(120));
        assert_eq!(config.doctor_timeout, Duration::from_secs(30));
        assert_eq!(config.bin_dir(), PathBuf::from("/opt/inference/bin"));
        assert_eq!(
            config.downloads_dir(),
            PathBuf::from("/opt/inference/downloads")
        );
        assert_eq!(config.binary_override, None);
    }

    #[test]
    #[serial_test::serial]
    fn from_env_reads_overrides() {
        clear_env();
        unsafe {
            std::env::set_var(INFERENCE_HOME_ENV, "/tmp/infs-home");
            std::env::set_var(DIST_SERVER_ENV, "http://localhost:8080");
            std::env::set_var(CHANNEL_ENV, "latest");
            std::env::set_var(INFS_PATH_ENV, "/usr/local/bin/infs");
        }

        let config = ProvisionConfig::from_env().expect("Should read config");
        assert_eq!(config.inference_home, PathBuf::from("/tmp/infs-home"));
        assert_eq!(config.manifest_url, "http://localhost:8080/releases.json");
        assert_eq!(config.channel, Channel::Latest);
        assert_eq!(
            config.binary_override,
            Some(PathBuf::from("/usr/local/bin/infs"))
        );

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn from_env_treats_blank_values_as_unset() {
        clear_env();
        unsafe {
            std::env::set_var(INFERENCE_HOME_ENV, "/tmp/infs-home");
            std::env::set_var(DIST_SERVER_ENV, "   ");
            std::env::set_var(CHANNEL_ENV, "");
            std::env::set_var(INFS_PATH_ENV, " ");
        }

        let config = ProvisionConfig::from_env().expect("Should read config");
        assert_eq!(
            config.manifest_url,
            "https://inference-lang.org/releases.json"
        );
        assert_eq!(config.channel, Channel::Stable);
        assert_eq!(config.binary_override, None);

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn unknown_channel_falls_back_to_stable() {
        clear_env();
        unsafe {
            std::env::set_var(INFERENCE_HOME_ENV, "/tmp/infs-home");
            std::env::set_var(CHANNEL_ENV, "nightly");
        }

        let config = ProvisionConfig::from_env().expect("Should read config");
        assert_eq!(config.channel, Channel::Stable);

        clear_env();
    }
}
