//! Single-process guard for a managed root

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::StoreError;

/// Lock file name under the managed root
pub const LOCK_FILE_NAME: &str = ".sefs.lock";

/// Exclusive advisory lock on `<root>/.sefs.lock`, released on drop
#[derive(Debug)]
pub struct RootLock {
    file: File,
    path: PathBuf,
}

impl RootLock {
    /// Take the lock without blocking
    pub fn acquire(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::LockFile {
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(root.to_path_buf()))?;

        tracing::debug!(path = %path.display(), "Acquired root lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release root lock");
        }
    }
}
