//! Identity Store
//!
//! Durable map from a file's logical identifier (the path it was first seen
//! at) to its current physical location, cluster and preview. The store is
//! the only thing that can find a file again after the synchronizer or the
//! user has moved it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::io::{read_json, write_json};
use super::StoreError;
use crate::models::{ClusterId, FileRecord};
use crate::utils::path_is_within;

/// State file name under the managed root
pub const STATE_FILE_NAME: &str = ".sefs_state.json";

#[derive(Debug, Default, Deserialize)]
struct StateFile {
    #[serde(default)]
    files: BTreeMap<PathBuf, FileRecord>,
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    files: &'a BTreeMap<PathBuf, FileRecord>,
    last_updated: DateTime<Utc>,
}

/// Durable identifier -> FileRecord map
///
/// Mutations only mark the store dirty; [`IdentityStore::save`] writes the
/// whole record atomically.
#[derive(Debug)]
pub struct IdentityStore {
    root: PathBuf,
    path: PathBuf,
    records: BTreeMap<PathBuf, FileRecord>,
    dirty: bool,
}

impl IdentityStore {
    /// Load the state file under `root` (empty if absent) and heal it
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let mut store = Self::load(root)?;
        let healed = store.migrate_on_load();
        if healed > 0 {
            tracing::info!(records = healed, "Backfilled current paths from older state");
            if let Err(e) = store.save() {
                tracing::error!(error = %e, "Failed to persist migrated state");
            }
        }
        Ok(store)
    }

    /// Load the state file as-is, without migration
    pub fn load(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(STATE_FILE_NAME);
        let state: StateFile = read_json(&path)?.unwrap_or_default();

        let records: BTreeMap<PathBuf, FileRecord> = state
            .files
            .into_iter()
            .map(|(identifier, mut record)| {
                record.identifier = identifier.clone();
                (identifier, record)
            })
            .collect();

        tracing::info!(path = %path.display(), records = records.len(), "Loaded identity store");

        Ok(Self {
            root: root.to_path_buf(),
            path,
            records,
            dirty: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn contains(&self, identifier: &Path) -> bool {
        self.records.contains_key(identifier)
    }

    pub fn get(&self, identifier: &Path) -> Option<&FileRecord> {
        self.records.get(identifier)
    }

    /// All records ordered by identifier
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Insert or replace the record for `identifier`
    pub fn update(
        &mut self,
        identifier: &Path,
        cluster_id: ClusterId,
        preview: String,
        current_path: PathBuf,
    ) -> &mut FileRecord {
        self.dirty = true;
        let record = self
            .records
            .entry(identifier.to_path_buf())
            .or_insert_with(|| FileRecord::new(identifier.to_path_buf(), cluster_id, String::new(), current_path.clone()));

        record.cluster_id = cluster_id;
        record.preview = preview;
        record.current_path = Some(current_path);
        record.updated_at = Utc::now();
        record
    }

    /// Drop a record; no-op if absent
    pub fn remove(&mut self, identifier: &Path) -> Option<FileRecord> {
        let removed = self.records.remove(identifier);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Drop every record whose identifier or current path lies under `directory`
    pub fn remove_within(&mut self, directory: &Path) -> Vec<PathBuf> {
        let doomed: Vec<PathBuf> = self
            .records
            .values()
            .filter(|record| {
                path_is_within(&record.identifier, directory)
                    || record
                        .current_path
                        .as_deref()
                        .is_some_and(|current| path_is_within(current, directory))
            })
            .map(|record| record.identifier.clone())
            .collect();

        for identifier in &doomed {
            self.records.remove(identifier);
        }
        if !doomed.is_empty() {
            self.dirty = true;
        }
        doomed
    }

    /// Identifier of the file known to live at `path`, if any
    ///
    /// Matches recorded current paths first. An identifier equal to `path`
    /// only counts while its file has not been recorded anywhere else; once
    /// the file has moved away, a new file at that path is a different file.
    pub fn identifier_for_path(&self, path: &Path) -> Option<PathBuf> {
        if let Some(record) = self
            .records
            .values()
            .find(|record| record.current_path.as_deref() == Some(path))
        {
            return Some(record.identifier.clone());
        }

        self.records
            .get(path)
            .filter(|record| record.current_path.is_none())
            .map(|record| record.identifier.clone())
    }

    /// Where the file with `identifier` is now
    ///
    /// Tries the recorded current path, then the identifier path itself, then
    /// a search for the same file name anywhere under the root.
    pub fn resolve_current_path(&self, identifier: &Path) -> Option<PathBuf> {
        if let Some(current) = self.records.get(identifier).and_then(|r| r.current_path.as_ref()) {
            if current.is_file() {
                return Some(current.clone());
            }
        }
        self.locate_untracked(identifier)
    }

    /// Resolution without the recorded current path
    ///
    /// Files recorded as another identifier's current path are never returned.
    fn locate_untracked(&self, identifier: &Path) -> Option<PathBuf> {
        if identifier.is_file() && !self.claimed_by_other(identifier, identifier) {
            return Some(identifier.to_path_buf());
        }
        find_by_name(&self.root, identifier, |candidate| !self.claimed_by_other(candidate, identifier))
    }

    fn claimed_by_other(&self, path: &Path, identifier: &Path) -> bool {
        self.records
            .values()
            .any(|record| record.identifier != identifier && record.current_path.as_deref() == Some(path))
    }

    /// Backfill `current_path` on records that lack one; returns how many healed
    pub fn migrate_on_load(&mut self) -> usize {
        let missing: Vec<PathBuf> = self
            .records
            .values()
            .filter(|record| record.current_path.is_none())
            .map(|record| record.identifier.clone())
            .collect();

        let mut healed = 0;
        for identifier in missing {
            match self.locate_untracked(&identifier) {
                Some(found) => {
                    if let Some(record) = self.records.get_mut(&identifier) {
                        tracing::debug!(
                            identifier = %identifier.display(),
                            current = %found.display(),
                            "Backfilled current path"
                        );
                        record.current_path = Some(found);
                        healed += 1;
                    }
                }
                None => {
                    tracing::warn!(identifier = %identifier.display(), "Could not locate file during migration");
                }
            }
        }

        if healed > 0 {
            self.dirty = true;
        }
        healed
    }

    /// Write the state file if anything changed since the last save
    ///
    /// On failure the store stays dirty so the next save retries.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }

        write_json(
            &self.path,
            &StateFileRef {
                files: &self.records,
                last_updated: Utc::now(),
            },
        )?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "Saved identity store");
        Ok(())
    }
}

/// First file under `root` with the same file name as `identifier`
///
/// Hidden entries are skipped and the walk is sorted by name.
fn find_by_name<F>(root: &Path, identifier: &Path, accept: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let name = identifier.file_name()?;

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name && accept(entry.path()))
        .map(|entry| entry.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOISE_CLUSTER;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_update_save_and_reload() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let id = root.join("a.txt");
        let current = root.join("Topic_X").join("a.txt");

        let mut store = IdentityStore::open(root).unwrap();
        store.update(&id, 0, "preview".to_string(), current.clone());
        assert!(store.is_dirty());
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reloaded = IdentityStore::load(root).unwrap();
        let record = reloaded.get(&id).unwrap();
        assert_eq!(record.identifier, id);
        assert_eq!(record.cluster_id, 0);
        assert_eq!(record.current_path.as_ref(), Some(&current));

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(root.join(STATE_FILE_NAME)).unwrap()).unwrap();
        assert!(raw.get("last_updated").is_some());
        assert_eq!(raw["files"][&*id.to_string_lossy()]["cluster"], 0);
    }

    #[test]
    fn test_resolve_follows_moved_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let id = root.join("a.txt");
        let moved = root.join("Topic_X").join("a.txt");
        write(&moved, "content");

        let mut store = IdentityStore::open(root).unwrap();
        store.update(&id, 0, String::new(), moved.clone());

        assert_eq!(store.resolve_current_path(&id), Some(moved));
    }

    #[test]
    fn test_resolve_falls_back_to_identifier_then_search() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let id = root.join("a.txt");
        let mut store = IdentityStore::open(root).unwrap();
        store.update(&id, 0, String::new(), root.join("Gone").join("a.txt"));

        // Recorded path stale, identifier still exists
        write(&id, "content");
        assert_eq!(store.resolve_current_path(&id), Some(id.clone()));

        // Moved externally somewhere else under the root
        let elsewhere = root.join("Manual").join("Nested").join("a.txt");
        fs::create_dir_all(elsewhere.parent().unwrap()).unwrap();
        fs::rename(&id, &elsewhere).unwrap();
        assert_eq!(store.resolve_current_path(&id), Some(elsewhere.clone()));

        fs::remove_file(&elsewhere).unwrap();
        assert_eq!(store.resolve_current_path(&id), None);
    }

    #[test]
    fn test_search_skips_hidden_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join(".trash").join("a.txt"), "hidden");

        let store = IdentityStore::open(root).unwrap();
        assert_eq!(store.resolve_current_path(&root.join("a.txt")), None);
    }

    #[test]
    fn test_migrate_backfills_missing_current_path() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let id = root.join("report.txt");
        let actual = root.join("Reports").join("report.txt");
        write(&actual, "content");

        let old_state = format!(
            r#"{{"files": {{{}: {{"cluster": 1, "preview": "p", "updated": "2024-01-01T00:00:00Z"}}}}, "last_updated": "2024-01-01T00:00:00Z"}}"#,
            serde_json::to_string(&id).unwrap()
        );
        fs::write(root.join(STATE_FILE_NAME), old_state).unwrap();

        let store = IdentityStore::open(root).unwrap();
        assert_eq!(store.get(&id).unwrap().current_path.as_ref(), Some(&actual));
        // Migration was persisted
        assert!(!store.is_dirty());
        let reloaded = IdentityStore::load(root).unwrap();
        assert_eq!(reloaded.get(&id).unwrap().current_path.as_ref(), Some(&actual));
    }

    #[test]
    fn test_identifier_for_path() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let id = root.join("a.txt");
        let current = root.join("Topic").join("a.txt");

        let mut store = IdentityStore::open(root).unwrap();
        store.update(&id, 0, String::new(), current.clone());

        assert_eq!(store.identifier_for_path(&current), Some(id.clone()));
        assert_eq!(store.identifier_for_path(&root.join("other.txt")), None);
        // The file moved away; its original path no longer maps to it
        assert_eq!(store.identifier_for_path(&id), None);

        store.update(&id, 0, String::new(), id.clone());
        assert_eq!(store.identifier_for_path(&id), Some(id));
    }

    #[test]
    fn test_resolve_skips_files_claimed_by_other_records() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let old_id = root.join("a.txt");
        let new_id = root.join("a~1.txt");
        write(&old_id, "newcomer");

        let mut store = IdentityStore::open(root).unwrap();
        // Old file moved away then vanished; a newcomer now sits at its original path
        store.update(&old_id, 0, String::new(), root.join("Gone").join("a.txt"));
        store.update(&new_id, NOISE_CLUSTER, String::new(), old_id.clone());

        assert_eq!(store.resolve_current_path(&new_id), Some(old_id.clone()));
        assert_eq!(store.resolve_current_path(&old_id), None);
    }

    #[test]
    fn test_remove_within_matches_identifier_or_current_path() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let mut store = IdentityStore::open(root).unwrap();
        store.update(&root.join("dir/a.txt"), 0, String::new(), root.join("dir/a.txt"));
        store.update(&root.join("b.txt"), 0, String::new(), root.join("dir/b.txt"));
        store.update(&root.join("dirOther/c.txt"), 0, String::new(), root.join("dirOther/c.txt"));

        let removed = store.remove_within(&root.join("dir"));

        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&root.join("dirOther/c.txt")));
    }

    #[test]
    fn test_save_is_skipped_when_clean() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let mut store = IdentityStore::open(root).unwrap();

        store.save().unwrap();
        assert!(!root.join(STATE_FILE_NAME).exists());
    }

    #[test]
    fn test_failed_save_stays_dirty_and_retries() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let state_file = root.join(STATE_FILE_NAME);
        let mut store = IdentityStore::open(root).unwrap();
        store.update(&root.join("a.txt"), 0, "p".to_string(), root.join("a.txt"));

        fs::create_dir(&state_file).unwrap();
        assert!(store.save().is_err());
        assert!(store.is_dirty());
        assert_eq!(store.len(), 1);

        fs::remove_dir(&state_file).unwrap();
        store.save().unwrap();
        assert!(!store.is_dirty());
        assert_eq!(IdentityStore::load(root).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_state_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), "{oops").unwrap();

        assert!(IdentityStore::open(dir.path()).is_err());
    }
}
