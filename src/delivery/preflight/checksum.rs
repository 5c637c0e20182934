//! Artifact checksum calculation.
//!
//! The upload protocol needs both a SHA-256 and an MD5 of the artifact. Both
//! are computed while streaming the file once.

use crate::delivery::error::{ErrorExt, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hex-encoded digests of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    /// 64 lowercase hex characters
    pub sha256: String,
    /// 32 lowercase hex characters
    pub md5: String,
}

/// Calculates SHA-256 and MD5 of a file in a single pass.
///
/// Reads the file in 8KB chunks and feeds every chunk to both hash states.
pub async fn calculate_digests(file_path: &Path) -> Result<FileDigests> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .fs_context("opening file for hashing", file_path)?;
    let mut sha256 = Sha256::new();
    let mut md5 = md5::Context::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", file_path)?;
        if n == 0 {
            break;
        }
        sha256.update(&buffer[..n]);
        md5.consume(&buffer[..n]);
    }

    Ok(FileDigests {
        sha256: format!("{:x}", sha256.finalize()),
        md5: format!("{:x}", md5.compute()),
    })
}
