//! Archive extraction for toolchain release artifacts.
//!
//! The format is chosen from the file name alone: `.tar.gz`/`.tgz` or
//! `.zip`. Anything else is rejected before any unpacking starts. Unpacking
//! itself is behind the [`Extractor`] trait:
//!
//! - [`SystemExtractor`] delegates to the platform tools (`tar`, and
//!   `Expand-Archive` or `unzip` for zip files)
//! - [`NativeExtractor`] unpacks in-process with the `tar`, `flate2` and
//!   `zip` crates
//!
//! After unpacking on Unix, regular files directly inside the destination
//! directory are made executable. That step is best-effort.

use std::ffi::OsStr;
use std::future::Future;
use std::path::{Component, Path};
use std::time::Duration;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};

use crate::errors::{ProcessFailure, ProvisionError, Result};
use crate::exec::{command_with_args, run_command};

/// Time budget for an external unpack tool.
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(120);

/// Archive formats accepted for release artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Picks the format from the archive's file name suffix.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Extraction`] naming the file if the suffix
    /// is not recognized.
    pub fn from_path(archive_path: &Path) -> Result<Self> {
        let name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(ProvisionError::extraction(format!(
                "Unsupported archive format: {name}"
            )))
        }
    }
}

/// Unpacks an archive of a known format into an existing directory.
pub trait Extractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProvisionError::Extraction`] if the archive cannot be
    /// unpacked.
    fn unpack(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Extracts `archive_path` into `dest_dir`, creating `dest_dir` if needed.
///
/// # Errors
///
/// Returns [`ProvisionError::Extraction`] for unsupported formats and unpack
/// failures, and [`ProvisionError::Io`] if `dest_dir` cannot be created.
pub async fn extract_archive<E: Extractor>(
    extractor: &E,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
        ProvisionError::io(
            format!("Failed to create directory: {}", dest_dir.display()),
            e,
        )
    })?;

    let format = ArchiveFormat::from_path(archive_path)?;
    debug!(archive = %archive_path.display(), ?format, dest = %dest_dir.display(), "extracting");
    extractor.unpack(archive_path, format, dest_dir).await?;

    set_executable_permissions(dest_dir).await;
    Ok(())
}

/// Sets mode `0o755` on every regular file directly inside `dir`.
///
/// Failures are logged and skipped; some filesystems ignore mode bits.
#[cfg(unix)]
pub async fn set_executable_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list extracted files");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list extracted files");
                break;
            }
        };
        let path = entry.path();
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if !is_file {
            continue;
        }
        let perms = std::fs::Permissions::from_mode(0o755);
        if let Err(e) = tokio::fs::set_permissions(&path, perms).await {
            warn!(path = %path.display(), error = %e, "could not mark file executable");
        }
    }
}

/// Sets executable permissions (no-op on Windows).
#[cfg(not(unix))]
pub async fn set_executable_permissions(_dir: &Path) {}

/// Unpacks with the operating system's archive tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExtractor;

impl Extractor for SystemExtractor {
    async fn unpack(&self, archive_path: &Path, format: ArchiveFormat, dest_dir: &Path) -> Result<()> {
        let (tool, command) = match format {
            ArchiveFormat::TarGz => (
                "tar",
                command_with_args(
                    "tar",
                    [
                        OsStr::new("-xzf"),
                        archive_path.as_os_str(),
                        OsStr::new("-C"),
                        dest_dir.as_os_str(),
                    ],
                ),
            ),
            ArchiveFormat::Zip if cfg!(windows) => {
                let script = format!(
                    "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
                    powershell_quote(archive_path),
                    powershell_quote(dest_dir)
                );
                (
                    "zip",
                    command_with_args(
                        "powershell",
                        ["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
                    ),
                )
            }
            ArchiveFormat::Zip => (
                "zip",
                command_with_args(
                    "unzip",
                    [
                        OsStr::new("-o"),
                        OsStr::new("-q"),
                        archive_path.as_os_str(),
                        OsStr::new("-d"),
                        dest_dir.as_os_str(),
                    ],
                ),
            ),
        };

        let output = run_command(command, Path::new(tool), EXTRACT_TIMEOUT)
            .await
            .map_err(|e| match e {
                ProvisionError::Process {
                    failure: ProcessFailure::Spawn | ProcessFailure::TimedOut,
                    message,
                } => ProvisionError::extraction(format!("{tool} extraction failed: {message}")),
                other => other,
            })?;

        if !output.success() {
            return Err(ProvisionError::extraction(format!(
                "{tool} extraction failed (exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

fn powershell_quote(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

/// Unpacks in-process without external tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeExtractor;

impl Extractor for NativeExtractor {
    async fn unpack(&self, archive_path: &Path, format: ArchiveFormat, dest_dir: &Path) -> Result<()> {
        let archive_path = archive_path.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || match format {
            ArchiveFormat::TarGz => extract_tar_gz(&archive_path, &dest_dir),
            ArchiveFormat::Zip => extract_zip(&archive_path, &dest_dir),
        })
        .await
        .map_err(|e| ProvisionError::extraction(format!("extraction task failed: {e}")))?
    }
}

fn reject_unsafe_path(entry_path: &Path) -> Result<()> {
    if entry_path.is_absolute()
        || entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ProvisionError::extraction(format!(
            "Refusing to extract path with parent directory or absolute reference: {}",
            entry_path.display()
        )));
    }
    Ok(())
}

/// Extracts a tar.gz archive into `dest_dir`, preserving its layout.
fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        ProvisionError::io(
            format!("Failed to open archive: {}", archive_path.display()),
            e,
        )
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let read_error = |e: std::io::Error| {
        ProvisionError::extraction(format!(
            "Failed to read tar entries of {}: {e}",
            archive_path.display()
        ))
    };

    for entry in archive.entries().map_err(read_error)? {
        let mut entry = entry.map_err(read_error)?;
        let entry_path = entry.path().map_err(read_error)?.into_owned();
        reject_unsafe_path(&entry_path)?;

        let output_path = dest_dir.join(&entry_path);
        if entry.header().entry_type().is_dir() {
            create_dir(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                create_dir(parent)?;
            }
            entry.unpack(&output_path).map_err(|e| {
                ProvisionError::extraction(format!(
                    "Failed to extract {}: {e}",
                    output_path.display()
                ))
            })?;
        }
    }

    Ok(())
}

/// Extracts a ZIP archive into `dest_dir`, preserving its layout.
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        ProvisionError::io(
            format!("Failed to open archive: {}", archive_path.display()),
            e,
        )
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        ProvisionError::extraction(format!(
            "Failed to read ZIP archive {}: {e}",
            archive_path.display()
        ))
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            ProvisionError::extraction(format!("Failed to read archive entry {i}: {e}"))
        })?;
        let entry_path = entry.enclosed_name().ok_or_else(|| {
            ProvisionError::extraction(format!("Invalid entry path in archive: entry {i}"))
        })?;
        reject_unsafe_path(&entry_path)?;

        let output_path = dest_dir.join(&entry_path);
        if entry.is_dir() {
            create_dir(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                create_dir(parent)?;
            }
            let mut outfile = std::fs::File::create(&output_path).map_err(|e| {
                ProvisionError::io(
                    format!("Failed to create file: {}", output_path.display()),
                    e,
                )
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                ProvisionError::extraction(format!(
                    "Failed to extract {}: {e}",
                    output_path.display()
                ))
            })?;
        }
    }

    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        ProvisionError::io(format!("Failed to create directory: {}", path.display()), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    /// Creates a tar.gz with a top-level `infs` and a nested `lib/` file.
    fn create_tar_gz(archive_path: &Path) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_size(14);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "infs", b"binary content".as_slice())
            .expect("Should append file");

        let mut header = tar::Header::new_gnu();
        header.set_size(15);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "lib/libinfs.so", b"library content".as_slice())
            .expect("Should append file");

        builder
            .into_inner()
            .expect("Should finish tar")
            .finish()
            .expect("Should finish gzip");
    }

    fn create_zip(archive_path: &Path) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("infs.exe", options)
            .expect("Should start file");
        zip.write_all(b"binary content").expect("Should write");
        zip.add_directory("lib/", options)
            .expect("Should add directory");
        zip.start_file("lib/helper.dll", options)
            .expect("Should start file");
        zip.write_all(b"library content").expect("Should write");
        zip.finish().expect("Should finish zip");
    }

    #[test]
    fn format_from_suffix() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("/tmp/infs-linux-x64.tar.gz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("infs.tgz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("infs-windows-x64.zip")).unwrap(),
            ArchiveFormat::Zip
        );
    }

    #[test]
    fn unsupported_suffix_names_file() {
        let err = ArchiveFormat::from_path(Path::new("/tmp/infs.rar")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
        assert!(err.to_string().contains("Unsupported archive format: infs.rar"));
    }

    #[tokio::test]
    async fn unsupported_format_fails_before_unpacking() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("infs.7z");
        std::fs::write(&archive, b"whatever").unwrap();
        let dest = dir.path().join("out");

        let err = extract_archive(&NativeExtractor, &archive, &dest)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
        assert!(dest.exists());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn native_tar_gz_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("infs-linux-x64.tar.gz");
        create_tar_gz(&archive);
        let dest = dir.path().join("bin");

        extract_archive(&NativeExtractor, &archive, &dest)
            .await
            .expect("Should extract");

        assert_eq!(std::fs::read(dest.join("infs")).unwrap(), b"binary content");
        assert!(dest.join("lib").join("libinfs.so").exists());
    }

    #[tokio::test]
    async fn native_zip_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("infs-windows-x64.zip");
        create_zip(&archive);
        let dest = dir.path().join("bin");

        extract_archive(&NativeExtractor, &archive, &dest)
            .await
            .expect("Should extract");

        assert_eq!(
            std::fs::read(dest.join("infs.exe")).unwrap(),
            b"binary content"
        );
        assert!(dest.join("lib").join("helper.dll").exists());
    }

    #[tokio::test]
    async fn corrupt_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip file").unwrap();

        let err = extract_archive(&NativeExtractor, &archive, &dir.path().join("out"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn mode(path: &Path) -> u32 {
            std::fs::metadata(path).unwrap().permissions().mode() & 0o777
        }

        #[tokio::test]
        async fn top_level_files_become_executable() {
            let dir = tempfile::tempdir().unwrap();
            let archive = dir.path().join("infs.tar.gz");
            create_tar_gz(&archive);
            let dest = dir.path().join("bin");

            extract_archive(&NativeExtractor, &archive, &dest)
                .await
                .expect("Should extract");

            assert_eq!(mode(&dest.join("infs")), 0o755);
            assert_eq!(mode(&dest.join("lib").join("libinfs.so")), 0o644);
        }

        #[tokio::test]
        async fn set_executable_permissions_tolerates_missing_dir() {
            set_executable_permissions(Path::new("/nonexistent/infs/bin")).await;
        }

        #[tokio::test]
        async fn system_tar_extracts() {
            let dir = tempfile::tempdir().unwrap();
            let archive = dir.path().join("infs-linux-x64.tar.gz");
            create_tar_gz(&archive);
            let dest = dir.path().join("bin");

            extract_archive(&SystemExtractor, &archive, &dest)
                .await
                .expect("Should extract with system tar");

            assert_eq!(std::fs::read(dest.join("infs")).unwrap(), b"binary content");
            assert_eq!(mode(&dest.join("infs")), 0o755);
        }

        #[tokio::test]
        async fn system_tar_failure_reports_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let archive = dir.path().join("broken.tar.gz");
            std::fs::write(&archive, b"not gzip data").unwrap();

            let err = extract_archive(&SystemExtractor, &archive, &dir.path().join("out"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Extraction);
            assert!(err.to_string().contains("tar extraction failed (exit"));
        }
    }
}
