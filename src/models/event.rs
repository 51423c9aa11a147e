use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of change reported by the directory watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    DirectoryDeleted,
}

impl FileEventKind {
    /// Whether this kind forces a reorganization pass in the tick that sees it
    ///
    /// `Created` is excluded so a confirmation step can precede reorganization.
    pub fn is_mutating(self) -> bool {
        !matches!(self, FileEventKind::Created)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileEventKind::Created => "created",
            FileEventKind::Modified => "modified",
            FileEventKind::Deleted => "deleted",
            FileEventKind::DirectoryDeleted => "directory_deleted",
        }
    }
}

/// A single `(kind, path)` change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Deleted, path)
    }

    pub fn directory_deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::DirectoryDeleted, path)
    }
}
