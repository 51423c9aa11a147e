//! Reorganization history
//!
//! Append-only log of past assignments, capped to the most recent entries.

use std::path::{Path, PathBuf};

use super::io::{read_json, write_json, SafeIoError};
use super::StoreError;
use crate::models::{Assignments, ClusterNames, HistorySnapshot};

/// History file name under the managed root
pub const HISTORY_FILE_NAME: &str = ".sefs_history.json";

/// Default number of snapshots retained
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    limit: usize,
    snapshots: Vec<HistorySnapshot>,
}

impl HistoryLog {
    /// Load the history under `root`, keeping at most `limit` newest entries
    pub fn open(root: &Path, limit: usize) -> Result<Self, StoreError> {
        let path = root.join(HISTORY_FILE_NAME);
        let mut snapshots: Vec<HistorySnapshot> = read_json(&path)?.unwrap_or_default();
        let limit = limit.max(1);
        truncate_oldest(&mut snapshots, limit);

        tracing::debug!(path = %path.display(), snapshots = snapshots.len(), "Loaded history");
        Ok(Self { path, limit, snapshots })
    }

    /// Snapshots oldest first, newest last
    pub fn snapshots(&self) -> &[HistorySnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn latest(&self) -> Option<&HistorySnapshot> {
        self.snapshots.last()
    }

    /// Record a pass and persist the log
    ///
    /// The in-memory log is updated even if the write fails.
    pub fn append_snapshot(&mut self, assignments: Assignments, names: ClusterNames) -> Result<(), SafeIoError> {
        self.snapshots.push(HistorySnapshot::new(assignments, names));
        truncate_oldest(&mut self.snapshots, self.limit);
        write_json(&self.path, &self.snapshots)
    }
}

fn truncate_oldest(snapshots: &mut Vec<HistorySnapshot>, limit: usize) {
    if snapshots.len() > limit {
        let excess = snapshots.len() - limit;
        snapshots.drain(..excess);
    }
}
