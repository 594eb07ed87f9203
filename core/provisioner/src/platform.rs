//! Platform detection for toolchain artifacts.
//!
//! Maps an operating system and architecture pair to the platform identifier
//! used in release artifact names, together with the archive and binary
//! naming for that platform.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` (`linux-x64`)
//! - macOS ARM64 (`macos-arm64`)
//! - Windows `x86_64` (`windows-x64`)

use std::fmt;

use crate::errors::{ProvisionError, Result};

/// Base name of the toolchain binary.
pub const TOOL_NAME: &str = "infs";

/// A supported platform for toolchain binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux on `x86_64`
    LinuxX64,
    /// macOS on ARM64 (Apple Silicon)
    MacosArm64,
    /// Windows on `x86_64`
    WindowsX64,
}

impl Platform {
    /// Maps an OS/architecture pair to a platform.
    ///
    /// Accepts both Rust target names (`linux`, `macos`, `windows`,
    /// `x86_64`, `aarch64`) and the Node-style names editors report
    /// (`darwin`, `win32`, `x64`, `arm64`). Returns `None` for any pair that
    /// has no published artifacts.
    #[must_use]
    pub fn from_os_arch(os: &str, arch: &str) -> Option<Self> {
        let os = match os {
            "linux" => "linux",
            "macos" | "darwin" => "macos",
            "windows" | "win32" => "windows",
            _ => return None,
        };
        let arch = match arch {
            "x86_64" | "x64" | "amd64" => "x64",
            "aarch64" | "arm64" => "arm64",
            _ => return None,
        };
        match (os, arch) {
            ("linux", "x64") => Some(Self::LinuxX64),
            ("macos", "arm64") => Some(Self::MacosArm64),
            ("windows", "x64") => Some(Self::WindowsX64),
            _ => None,
        }
    }

    /// Detects the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] if the current
    /// OS/architecture combination is not supported.
    pub fn detect() -> Result<Self> {
        let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
        Self::from_os_arch(os, arch).ok_or_else(|| ProvisionError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    /// Returns the platform identifier used in artifact file names.
    #[must_use = "returns the platform string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux-x64",
            Self::MacosArm64 => "macos-arm64",
            Self::WindowsX64 => "windows-x64",
        }
    }

    /// Returns the OS token encoded as the second segment of artifact names.
    ///
    /// One of: `"linux"`, `"macos"`, `"windows"`
    #[must_use = "returns the OS string without side effects"]
    pub fn os(self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux",
            Self::MacosArm64 => "macos",
            Self::WindowsX64 => "windows",
        }
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::WindowsX64)
    }

    /// Returns the archive extension release artifacts use on this platform.
    #[must_use]
    pub fn archive_extension(self) -> &'static str {
        match self {
            Self::WindowsX64 => ".zip",
            Self::LinuxX64 | Self::MacosArm64 => ".tar.gz",
        }
    }

    /// Returns the file name of the toolchain binary on this platform.
    #[must_use]
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::WindowsX64 => "infs.exe",
            Self::LinuxX64 | Self::MacosArm64 => TOOL_NAME,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform identity plus the naming conventions derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    pub id: Platform,
    pub archive_extension: &'static str,
    pub binary_name: &'static str,
}

impl PlatformInfo {
    /// Looks up the platform info for an OS/architecture pair.
    #[must_use]
    pub fn lookup(os: &str, arch: &str) -> Option<Self> {
        Platform::from_os_arch(os, arch).map(Self::from)
    }

    /// Looks up the platform info for the running process.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] on unsupported systems.
    pub fn current() -> Result<Self> {
        Platform::detect().map(Self::from)
    }

    /// File name of the release archive for this platform.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{TOOL_NAME}-{}{}", self.id, self.archive_extension)
    }
}

impl From<Platform> for PlatformInfo {
    fn from(id: Platform) -> Self {
        Self {
            id,
            archive_extension: id.archive_extension(),
            binary_name: id.binary_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_supported_pairs() {
        assert_eq!(
            Platform::from_os_arch("linux", "x86_64"),
            Some(Platform::LinuxX64)
        );
        assert_eq!(
            Platform::from_os_arch("darwin", "arm64"),
            Some(Platform::MacosArm64)
        );
        assert_eq!(
            Platform::from_os_arch("macos", "aarch64"),
            Some(Platform::MacosArm64)
        );
        assert_eq!(
            Platform::from_os_arch("win32", "x64"),
            Some(Platform::WindowsX64)
        );
    }

    #[test]
    fn rejects_unsupported_pairs() {
        assert_eq!(Platform::from_os_arch("linux", "aarch64"), None);
        assert_eq!(Platform::from_os_arch("darwin", "x64"), None);
        assert_eq!(Platform::from_os_arch("windows", "arm64"), None);
        assert_eq!(Platform::from_os_arch("freebsd", "x86_64"), None);
        assert_eq!(Platform::from_os_arch("", ""), None);
    }

    #[test]
    fn platform_info_naming() {
        let linux = PlatformInfo::lookup("linux", "x64").expect("linux-x64 is supported");
        assert_eq!(linux.archive_extension, ".tar.gz");
        assert_eq!(linux.binary_name, "infs");
        assert_eq!(linux.archive_name(), "infs-linux-x64.tar.gz");

        let macos = PlatformInfo::lookup("darwin", "arm64").expect("macos-arm64 is supported");
        assert_eq!(macos.archive_extension, ".tar.gz");
        assert_eq!(macos.binary_name, "infs");

        let windows = PlatformInfo::lookup("win32", "x64").expect("windows-x64 is supported");
        assert_eq!(windows.archive_extension, ".zip");
        assert_eq!(windows.binary_name, "infs.exe");
        assert_eq!(windows.archive_name(), "infs-windows-x64.zip");
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(format!("{}", Platform::LinuxX64), "linux-x64");
        assert_eq!(format!("{}", Platform::MacosArm64), "macos-arm64");
        assert_eq!(format!("{}", Platform::WindowsX64), "windows-x64");
    }

    #[test]
    fn os_tokens() {
        assert_eq!(Platform::LinuxX64.os(), "linux");
        assert_eq!(Platform::MacosArm64.os(), "macos");
        assert_eq!(Platform::WindowsX64.os(), "windows");
        assert!(Platform::WindowsX64.is_windows());
        assert!(!Platform::LinuxX64.is_windows());
    }

    #[test]
    fn detect_matches_build_target() {
        let result = Platform::detect();
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        assert!(matches!(result, Ok(Platform::LinuxX64)));

        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        assert!(matches!(result, Ok(Platform::MacosArm64)));

        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        assert!(matches!(result, Ok(Platform::WindowsX64)));

        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64")
        )))]
        assert!(result.is_err());
    }
}
