//! Release manifest handling.
//!
//! The manifest is a flat JSON array of release entries with minimal file
//! metadata. The tool name and OS of each artifact are derived from the file
//! name at the end of its URL:
//!
//! ```json
//! [
//!   {
//!     "version": "0.2.0",
//!     "stable": true,
//!     "files": [
//!       {
//!         "url": "https://github.com/Inferara/inference/releases/download/v0.2.0/infs-linux-x64.tar.gz",
//!         "sha256": "abc123..."
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! Entries are validated one by one before resolution. A malformed entry is
//! logged together with its JSON content and skipped, so a stale entry for
//! one platform never blocks installs on another.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::download::Downloader;
use crate::errors::{ProvisionError, Result};
use crate::platform::{Platform, TOOL_NAME};
use crate::version::compare_versions;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Platform-specific artifact in a release.
///
/// URL format: `https://.../tool-os-arch.ext` (e.g., `infs-linux-x64.tar.gz`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Download URL for the artifact.
    pub url: String,
    /// SHA-256 checksum of the artifact, lowercase hex.
    pub sha256: String,
}

impl FileEntry {
    /// Extracts the file name from the URL (last path segment).
    ///
    /// Example: `"https://.../infs-linux-x64.tar.gz"` -> `"infs-linux-x64.tar.gz"`
    #[must_use]
    pub fn filename(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    /// Extracts the tool name from the file name (first segment before '-').
    ///
    /// Example: `"infs-linux-x64.tar.gz"` -> `"infs"`
    #[must_use]
    pub fn tool(&self) -> &str {
        self.filename().split('-').next().unwrap_or("")
    }

    /// Extracts the OS from the file name (second segment).
    ///
    /// Example: `"infs-linux-x64.tar.gz"` -> `"linux"`
    #[must_use]
    pub fn os(&self) -> &str {
        self.filename().split('-').nth(1).unwrap_or("")
    }

    fn has_valid_digest(&self) -> bool {
        self.sha256.len() == SHA256_HEX_LEN
            && self
                .sha256
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

/// One release in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseEntry {
    /// The version string (e.g., "0.2.0").
    pub version: String,
    /// Whether this is a stable release.
    pub stable: bool,
    /// Platform-specific files for this release.
    pub files: Vec<FileEntry>,
}

impl ReleaseEntry {
    /// Finds the artifact of `tool` built for `platform`.
    ///
    /// Each OS has exactly one supported architecture, so matching is done
    /// by OS and tool name only.
    #[must_use = "returns artifact info without side effects"]
    pub fn find_artifact(&self, platform: Platform, tool: &str) -> Option<&FileEntry> {
        let os = platform.os();
        self.files.iter().find(|f| f.tool() == tool && f.os() == os)
    }
}

/// Update track used to pick a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    /// Only releases flagged stable.
    #[default]
    Stable,
    /// Any release, including pre-releases.
    Latest,
}

impl Channel {
    /// Interprets a configured channel name; anything unrecognised is `Stable`.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value.trim() {
            "latest" => Self::Latest,
            _ => Self::Stable,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Latest => "latest",
        }
    }

    fn admits(self, release: &ReleaseEntry) -> bool {
        match self {
            Self::Stable => release.stable,
            Self::Latest => true,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The artifact chosen for a platform and channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMatch {
    pub release: ReleaseEntry,
    pub file_url: String,
    pub sha256: String,
}

/// Validates a manifest document and converts it into release entries.
///
/// Entries with the wrong shape (missing fields, wrong types, or a digest
/// that is not 64 lowercase hex characters) are dropped one by one and
/// logged with their index and content; resolution proceeds over the rest.
///
/// # Errors
///
/// Returns [`ProvisionError::Manifest`] if the document is not an array, or
/// if it has entries but none of them is valid. The error lists every
/// offending entry.
pub fn parse_manifest(document: Value) -> Result<Vec<ReleaseEntry>> {
    let Value::Array(entries) = document else {
        return Err(ProvisionError::manifest(format!(
            "expected a JSON array of releases, got {}",
            json_type_name(&document)
        )));
    };

    let mut releases = Vec::with_capacity(entries.len());
    let mut problems = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let problem = match serde_json::from_value::<ReleaseEntry>(entry.clone()) {
            Ok(release) => {
                let bad_digest = release
                    .files
                    .iter()
                    .find(|f| !f.has_valid_digest())
                    .map(|file| {
                        format!(
                            "entry {index} has an invalid sha256 {:?} for {}: {entry}",
                            file.sha256, file.url
                        )
                    });
                match bad_digest {
                    Some(problem) => problem,
                    None => {
                        releases.push(release);
                        continue;
                    }
                }
            }
            Err(e) => format!("entry {index} is malformed ({e}): {entry}"),
        };
        warn!(index, %entry, "skipping invalid manifest entry: {problem}");
        problems.push(problem);
    }

    if releases.is_empty() && !problems.is_empty() {
        return Err(ProvisionError::manifest(format!(
            "no valid release entries:\n  {}",
            problems.join("\n  ")
        )));
    }
    Ok(releases)
}

/// Fetches and validates the release manifest at `url`.
///
/// # Errors
///
/// Propagates transport and protocol errors from the downloader, and
/// returns [`ProvisionError::Manifest`] for unparseable documents and for
/// documents without a single valid entry.
pub async fn fetch_manifest(downloader: &Downloader, url: &str) -> Result<Vec<ReleaseEntry>> {
    let document = downloader.fetch_json(url).await?;
    let releases = parse_manifest(document)?;
    debug!(url, releases = releases.len(), "fetched release manifest");
    Ok(releases)
}

/// Picks the newest release in `channel` that ships the `infs` artifact for
/// `platform`.
#[must_use]
pub fn resolve_release(
    releases: &[ReleaseEntry],
    platform: Platform,
    channel: Channel,
) -> Option<ReleaseMatch> {
    resolve_tool_release(releases, platform, channel, TOOL_NAME)
}

/// Picks the newest release in `channel` that ships `tool` for `platform`.
///
/// Releases without a matching artifact are skipped. Returns `None` for an
/// empty manifest or when no release carries the artifact.
#[must_use]
pub fn resolve_tool_release(
    releases: &[ReleaseEntry],
    platform: Platform,
    channel: Channel,
    tool: &str,
) -> Option<ReleaseMatch> {
    let mut candidates: Vec<&ReleaseEntry> =
        releases.iter().filter(|r| channel.admits(r)).collect();
    candidates.sort_by(|a, b| compare_versions(&b.version, &a.version));

    candidates.into_iter().find_map(|release| {
        release
            .find_artifact(platform, tool)
            .map(|file| ReleaseMatch {
                release: release.clone(),
                file_url: file.url.clone(),
                sha256: file.sha256.clone(),
            })
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const HASH_C: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn release(version: &str, stable: bool, files: &[(&str, &str)]) -> ReleaseEntry {
        ReleaseEntry {
            version: version.to_string(),
            stable,
            files: files
                .iter()
                .map(|(url, sha256)| FileEntry {
                    url: (*url).to_string(),
                    sha256: (*sha256).to_string(),
                })
                .collect(),
        }
    }

    fn two_channel_manifest() -> Vec<ReleaseEntry> {
        vec![
            release(
                "1.0.0",
                true,
                &[("https://example.com/1.0.0/infs-linux-x64.tar.gz", HASH_A)],
            ),
            release(
                "2.0.0",
                false,
                &[("https://example.com/2.0.0/infs-linux-x64.tar.gz", HASH_B)],
            ),
        ]
    }

    #[test]
    fn file_entry_derives_tokens_from_url() {
        let file = FileEntry {
            url: "https://example.com/v0.2.0/infs-macos-arm64.tar.gz".to_string(),
            sha256: HASH_A.to_string(),
        };
        assert_eq!(file.filename(), "infs-macos-arm64.tar.gz");
        assert_eq!(file.tool(), "infs");
        assert_eq!(file.os(), "macos");
    }

    #[test]
    fn file_entry_without_os_segment() {
        let file = FileEntry {
            url: "https://example.com/infs.tar.gz".to_string(),
            sha256: HASH_A.to_string(),
        };
        assert_eq!(file.tool(), "infs.tar.gz");
        assert_eq!(file.os(), "");
    }

    #[test]
    fn stable_channel_skips_unstable_releases() {
        let manifest = two_channel_manifest();
        let matched = resolve_release(&manifest, Platform::LinuxX64, Channel::Stable)
            .expect("stable release exists");
        assert_eq!(matched.release.version, "1.0.0");
        assert_eq!(matched.sha256, HASH_A);
    }

    #[test]
    fn latest_channel_picks_highest_version() {
        let manifest = two_channel_manifest();
        let matched = resolve_release(&manifest, Platform::LinuxX64, Channel::Latest)
            .expect("release exists");
        assert_eq!(matched.release.version, "2.0.0");
        assert_eq!(matched.sha256, HASH_B);
        assert_eq!(
            matched.file_url,
            "https://example.com/2.0.0/infs-linux-x64.tar.gz"
        );
    }

    #[test]
    fn other_tool_artifacts_do_not_match() {
        let manifest = vec![release(
            "1.0.0",
            true,
            &[("https://example.com/1.0.0/infc-linux-x64.tar.gz", HASH_A)],
        )];
        assert!(resolve_release(&manifest, Platform::LinuxX64, Channel::Stable).is_none());
        assert!(
            resolve_tool_release(&manifest, Platform::LinuxX64, Channel::Stable, "infc").is_some()
        );
    }

    #[test]
    fn releases_without_platform_artifact_are_skipped() {
        let manifest = vec![
            release(
                "0.3.0",
                true,
                &[("https://example.com/0.3.0/infs-windows-x64.zip", HASH_C)],
            ),
            release(
                "0.2.0",
                true,
                &[
                    ("https://example.com/0.2.0/infs-windows-x64.zip", HASH_A),
                    ("https://example.com/0.2.0/infs-macos-arm64.tar.gz", HASH_B),
                ],
            ),
        ];
        let matched = resolve_release(&manifest, Platform::MacosArm64, Channel::Stable)
            .expect("0.2.0 has a macOS artifact");
        assert_eq!(matched.release.version, "0.2.0");
        assert_eq!(matched.sha256, HASH_B);
    }

    #[test]
    fn empty_manifest_has_no_match() {
        assert!(resolve_release(&[], Platform::LinuxX64, Channel::Latest).is_none());
    }

    #[test]
    fn prerelease_ranks_below_its_release() {
        let manifest = vec![
            release(
                "1.0.0-rc.1",
                false,
                &[("https://example.com/rc/infs-linux-x64.tar.gz", HASH_A)],
            ),
            release(
                "1.0.0",
                true,
                &[("https://example.com/final/infs-linux-x64.tar.gz", HASH_B)],
            ),
        ];
        let matched = resolve_release(&manifest, Platform::LinuxX64, Channel::Latest)
            .expect("release exists");
        assert_eq!(matched.release.version, "1.0.0");
    }

    #[test]
    fn channel_from_setting_defaults_to_stable() {
        assert_eq!(Channel::from_setting("latest"), Channel::Latest);
        assert_eq!(Channel::from_setting("stable"), Channel::Stable);
        assert_eq!(Channel::from_setting("nightly"), Channel::Stable);
        assert_eq!(Channel::from_setting(""), Channel::Stable);
    }

    #[test]
    fn parse_manifest_accepts_valid_document() {
        let document = json!([
            {
                "version": "0.1.0",
                "stable": true,
                "files": [{ "url": "https://example.com/infs-linux-x64.tar.gz", "sha256": HASH_C }]
            },
            { "version": "0.2.0-alpha", "stable": false, "files": [] }
        ]);
        let releases = parse_manifest(document).expect("valid manifest");
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].files[0].tool(), "infs");
    }

    #[test]
    fn parse_manifest_rejects_non_array() {
        let err = parse_manifest(json!({ "version": "0.1.0" })).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn parse_manifest_skips_malformed_entries() {
        let document = json!([
            { "version": "0.1.0", "stable": "yes", "files": [] },
            { "version": "0.2.0", "stable": true, "files": [] },
            { "version": 3, "stable": true, "files": [] }
        ]);
        let releases = parse_manifest(document).expect("one entry is valid");
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version, "0.2.0");
    }

    #[test]
    fn parse_manifest_fails_when_every_entry_is_invalid() {
        let document = json!([
            { "version": "0.1.0", "stable": "yes", "files": [] },
            {
                "version": "0.2.0",
                "stable": true,
                "files": [{ "url": "https://example.com/infs-linux-x64.tar.gz", "sha256": "ABC" }]
            }
        ]);
        let err = parse_manifest(document).unwrap_err().to_string();
        assert!(err.contains("entry 0"), "{err}");
        assert!(err.contains("\"yes\""), "{err}");
        assert!(err.contains("entry 1 has an invalid sha256 \"ABC\""), "{err}");
    }

    #[test]
    fn parse_manifest_accepts_empty_array() {
        assert!(parse_manifest(json!([])).expect("empty is valid").is_empty());
    }

    #[test]
    fn bad_entry_for_other_platform_does_not_block_resolution() {
        let document = json!([
            {
                "version": "0.2.0",
                "stable": true,
                "files": [{ "url": "https://example.com/v0.2.0/infs-linux-x64.tar.gz", "sha256": HASH_A }]
            },
            {
                "version": "0.0.1",
                "stable": true,
                "files": [{ "url": "https://example.com/v0.0.1/infs-windows-x64.zip", "sha256": "ABC" }]
            }
        ]);
        let releases = parse_manifest(document).expect("valid entries remain");
        let matched = resolve_release(&releases, Platform::LinuxX64, Channel::Stable)
            .expect("linux release resolves");
        assert_eq!(matched.release.version, "0.2.0");
        assert_eq!(matched.sha256, HASH_A);
    }
}
