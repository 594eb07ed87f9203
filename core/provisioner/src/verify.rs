//! Checksum verification for downloaded toolchain archives.
//!
//! Files are streamed through SHA-256 in fixed-size blocks so an archive is
//! never held in memory as a whole.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::errors::{ProvisionError, Result};

/// Verifies that a file hashes to the expected SHA-256 digest.
///
/// The digest is compared against `expected` by exact string equality, so
/// `expected` must be the lowercase hex form.
///
/// # Errors
///
/// Returns [`ProvisionError::Io`] if the file cannot be read and
/// [`ProvisionError::Integrity`] naming both digests on a mismatch.
pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<()> {
    let computed = compute_sha256(file_path).await?;

    if computed != expected {
        return Err(ProvisionError::integrity(file_path, expected, computed));
    }

    Ok(())
}

/// Computes the SHA-256 of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns [`ProvisionError::Io`] if the file cannot be opened or read.
pub async fn compute_sha256(file_path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(file_path).await.map_err(|e| {
        ProvisionError::io(
            format!("Failed to open file for checksum: {}", file_path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(|e| {
            ProvisionError::io(
                format!("Failed to read file for checksum: {}", file_path.display()),
                e,
            )
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
