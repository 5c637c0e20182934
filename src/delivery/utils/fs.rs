//! File system utilities for verification and delivery.
//!
//! Provides scoped scratch directories, absolute path resolution and safe
//! file copies with automatic directory creation.

use crate::delivery::error::{Error, ErrorExt, Result};
use path_absolutize::Absolutize;
use std::{
    future::Future,
    path::{Path, PathBuf},
};
use tokio::fs;

/// A uniquely named temporary directory removed recursively when released.
///
/// Removal happens on [`ScratchDir::close`] and, as a fallback, on drop, so a
/// panic or a cancelled future never leaks the directory.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Creates a fresh directory under the system temp dir named `{prefix}XXXXXX`.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir().map_err(|e| {
            Error::infrastructure_with(
                format!("Failed to create scratch directory with prefix {}: {}", prefix, e),
                e,
            )
        })?;
        log::debug!("Created scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Path of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory and everything inside it.
    ///
    /// Removal failures are logged, never returned: cleanup must not mask the
    /// outcome of the work done inside the directory.
    pub async fn close(self) {
        let path = self.dir.path().to_path_buf();
        let removal = tokio::task::spawn_blocking(move || self.dir.close()).await;
        match removal {
            Ok(Ok(())) => log::debug!("Removed scratch directory {}", path.display()),
            Ok(Err(e)) => {
                log::warn!("Failed to remove scratch directory {}: {}", path.display(), e)
            }
            Err(e) => log::warn!(
                "Scratch directory cleanup task failed for {}: {}",
                path.display(),
                e
            ),
        }
    }
}

/// Runs `work` inside a fresh scratch directory and removes it afterwards,
/// whatever `work` returns.
pub async fn with_scratch_dir<T, F, Fut>(prefix: &str, work: F) -> Result<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scratch = ScratchDir::new(prefix)?;
    let result = work(scratch.path().to_path_buf()).await;
    scratch.close().await;
    result
}

/// Resolves `path` against the current directory without touching the file system.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    path.absolutize()
        .map(|p| p.into_owned())
        .fs_context("resolving absolute path of", path)
}

/// Returns true when `path` can be opened for reading.
pub async fn is_readable(path: &Path) -> bool {
    fs::File::open(path).await.is_ok()
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let metadata = fs::metadata(from)
        .await
        .fs_context("reading metadata of", from)?;
    if !metadata.is_file() {
        return Err(Error::infrastructure(format!("{} is not a file", from.display())));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying to", to)?;
    Ok(())
}
