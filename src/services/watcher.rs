//! Directory watcher
//!
//! Turns debounced filesystem notifications under the managed root into
//! [`FileEvent`]s on a channel. The watcher never touches engine state; the
//! channel is the only thing it shares with the coordinator.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::FileEvent;
use crate::utils::{has_supported_extension, is_hidden_relative};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Recursive watcher over the managed root; stops when dropped
pub struct DirectoryWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    root: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `root`, sending classified events to `sender`
    pub fn start(
        root: &Path,
        extensions: Vec<String>,
        debounce: Duration,
        sender: Sender<FileEvent>,
    ) -> Result<Self, WatcherError> {
        let filter_root = root.to_path_buf();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    for path in &event.paths {
                        let Some(file_event) = classify(&event.kind, path, &filter_root, &extensions) else {
                            continue;
                        };
                        tracing::debug!(kind = file_event.kind.as_str(), path = %path.display(), "Watcher event");
                        if sender.send(file_event).is_err() {
                            // Receiver gone; the engine is shutting down
                            return;
                        }
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(error = %error, "Watcher error");
                }
            }
        })
        .map_err(WatcherError::Create)?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatcherError::Watch {
                path: root.to_path_buf(),
                source,
            })?;

        tracing::info!(root = %root.display(), "Watching directory");
        Ok(Self {
            _debouncer: debouncer,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map one notification path to an engine event, or `None` to ignore it
///
/// Renames reported by their source side are ignored: the synchronizer's own
/// moves show up that way. The destination side of a rename is an arrival.
pub fn classify(kind: &EventKind, path: &Path, root: &Path, extensions: &[String]) -> Option<FileEvent> {
    if is_hidden_relative(path, root) {
        return None;
    }
    let supported = has_supported_extension(path, extensions);

    match kind {
        EventKind::Remove(RemoveKind::Folder) => Some(FileEvent::directory_deleted(path)),
        EventKind::Remove(RemoveKind::File) if supported => Some(FileEvent::deleted(path)),
        EventKind::Remove(_) if supported => Some(FileEvent::deleted(path)),
        EventKind::Remove(RemoveKind::Any | RemoveKind::Other) => Some(FileEvent::directory_deleted(path)),

        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) if supported => Some(FileEvent::created(path)),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) if supported => Some(FileEvent::created(path)),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) if supported => Some(FileEvent::modified(path)),

        _ => None,
    }
}

/// Every supported file under `root`, skipping hidden entries, sorted by path
pub fn get_all_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_supported_extension(entry.path(), extensions))
        .map(|entry| entry.into_path())
        .collect()
}
