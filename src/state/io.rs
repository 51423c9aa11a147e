//! Crash-safe persistence helpers
//!
//! State and history records are rewritten whole on every save. A write goes
//! to a temporary sibling file, is fsynced, renamed over the target, and the
//! directory is fsynced so the rename survives a power loss.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for safe I/O operations
#[derive(Debug, Error)]
pub enum SafeIoError {
    #[error("Cannot determine parent directory for: {0}")]
    NoParent(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to sync {path}: {source}")]
    Sync { path: PathBuf, source: io::Error },

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Malformed JSON in {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

/// Write data to a file atomically with fsync
///
/// If any step fails, the temporary file is cleaned up and the previous
/// content of `path` is left intact.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SafeIoError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| SafeIoError::NoParent(path.to_path_buf()))?;

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|source| SafeIoError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_name = format!(
        ".{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string()),
        std::process::id()
    );
    let temp_path = parent.join(&temp_name);

    let write_result = (|| -> Result<(), SafeIoError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|source| SafeIoError::Write {
                path: temp_path.clone(),
                source,
            })?;

        file.write_all(data).map_err(|source| SafeIoError::Write {
            path: temp_path.clone(),
            source,
        })?;

        file.sync_all().map_err(|source| SafeIoError::Sync {
            path: temp_path.clone(),
            source,
        })
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SafeIoError::Rename {
            from: temp_path,
            to: path.to_path_buf(),
            source,
        });
    }

    sync_directory(parent)
}

/// Sync a directory so that renames inside it are durable
///
/// A no-op on platforms without directory fsync.
pub fn sync_directory(path: &Path) -> Result<(), SafeIoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(path)
            .map_err(|source| SafeIoError::Sync {
                path: path.to_path_buf(),
                source,
            })?;

        dir.sync_all().map_err(|source| SafeIoError::Sync {
            path: path.to_path_buf(),
            source,
        })?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SafeIoError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| SafeIoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &data)
}

/// Read a JSON record, returning `None` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SafeIoError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SafeIoError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| SafeIoError::Json {
            path: path.to_path_buf(),
            source,
        })
}
