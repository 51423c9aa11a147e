//! Durable State Module
//!
//! Identity records, reorganization history and the process lock, all kept
//! as hidden files under the managed root.

pub mod history;
pub mod io;
pub mod lock;
pub mod store;

pub use history::*;
pub use io::{atomic_write, sync_directory, SafeIoError};
pub use lock::*;
pub use store::*;

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or persisting durable state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] SafeIoError),

    #[error("Root {0} is already managed by another process")]
    Locked(PathBuf),

    #[error("Failed to open lock file {path}: {source}")]
    LockFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
