//! Folder Synchronizer
//!
//! Maps cluster assignments onto the directory layout under the managed root
//! and moves files to match. Running it twice with unchanged input performs no
//! filesystem mutation the second time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::sanitize::sanitize_folder_name;
use crate::models::{fallback_cluster_name, Assignments, ClusterId, ClusterNames, FolderInfo, NOISE_CLUSTER};
use crate::utils::has_supported_extension;

/// Errors for a single file or folder within a sync pass
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Source has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to create folder {path}: {message}")]
    CreateFolder { path: PathBuf, message: String },

    #[error("Failed to move {source_path} to {destination}: {message}")]
    Io {
        source_path: PathBuf,
        destination: PathBuf,
        message: String,
    },
}

/// A file that could not be placed this pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub identifier: PathBuf,
    pub reason: String,
}

/// Result of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// identifier -> new path, only for files actually moved
    pub moved: BTreeMap<PathBuf, PathBuf>,
    /// Files already in place
    pub unchanged: usize,
    pub failed: Vec<SyncFailure>,
    pub folders_created: Vec<PathBuf>,
    pub folders_removed: Vec<PathBuf>,
}

impl SyncReport {
    pub fn move_count(&self) -> usize {
        self.moved.len()
    }

    fn fail(&mut self, identifier: &Path, error: MoveError) {
        tracing::warn!(path = %identifier.display(), error = %error, "Skipping file this pass");
        self.failed.push(SyncFailure {
            identifier: identifier.to_path_buf(),
            reason: error.to_string(),
        });
    }
}

/// Keeps the directory layout under `root` in line with cluster assignments
pub struct FolderSynchronizer {
    root: PathBuf,
    max_name_len: usize,
    extensions: Vec<String>,
}

impl FolderSynchronizer {
    pub fn new(root: PathBuf, max_name_len: usize, extensions: Vec<String>) -> Self {
        Self {
            root,
            max_name_len,
            extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Place every assigned file into its cluster's folder
    ///
    /// `locate` maps an identifier to the file's current location. Failures
    /// for individual files are recorded in the report and never abort the pass.
    pub fn sync<F>(&self, assignments: &Assignments, names: &ClusterNames, locate: F) -> SyncReport
    where
        F: Fn(&Path) -> Option<PathBuf>,
    {
        let mut report = SyncReport::default();

        if let Err(e) = fs::create_dir_all(&self.root) {
            tracing::error!(root = %self.root.display(), error = %e, "Managed root unavailable");
        }

        // Group files by cluster
        let mut clusters: BTreeMap<ClusterId, Vec<&PathBuf>> = BTreeMap::new();
        for (identifier, cluster_id) in assignments {
            clusters.entry(*cluster_id).or_default().push(identifier);
        }

        let mut claimed_names: HashSet<String> = HashSet::new();

        for (cluster_id, members) in clusters {
            let folder_name = self.folder_name_for(cluster_id, names, &mut claimed_names);
            let folder = self.root.join(&folder_name);

            if let Err(error) = self.ensure_folder(&folder, &mut report) {
                for identifier in members {
                    report.fail(
                        identifier,
                        MoveError::CreateFolder {
                            path: folder.clone(),
                            message: error.to_string(),
                        },
                    );
                }
                continue;
            }

            for identifier in members {
                let Some(source) = locate(identifier) else {
                    report.fail(identifier, MoveError::SourceMissing(identifier.clone()));
                    continue;
                };

                let destination = match plan_destination(&folder, &source) {
                    Ok(destination) => destination,
                    Err(error) => {
                        report.fail(identifier, error);
                        continue;
                    }
                };

                if destination == source {
                    report.unchanged += 1;
                    continue;
                }

                match move_file(&source, &destination) {
                    Ok(()) => {
                        tracing::info!(
                            file = %source.file_name().unwrap_or_default().to_string_lossy(),
                            folder = %folder_name,
                            "Moved file"
                        );
                        report.moved.insert(identifier.clone(), destination);
                    }
                    Err(error) => report.fail(identifier, error),
                }
            }
        }

        report.folders_removed = self.cleanup_empty_folders();

        tracing::info!(
            moved = report.moved.len(),
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "Folder sync complete"
        );
        report
    }

    /// Sanitized folder name for a cluster, unique within this pass
    fn folder_name_for(&self, cluster_id: ClusterId, names: &ClusterNames, claimed: &mut HashSet<String>) -> String {
        let raw = if cluster_id == NOISE_CLUSTER {
            fallback_cluster_name(NOISE_CLUSTER)
        } else {
            names
                .get(&cluster_id)
                .cloned()
                .unwrap_or_else(|| fallback_cluster_name(cluster_id))
        };

        let base = sanitize_folder_name(&raw, self.max_name_len);
        let mut name = base.clone();
        let mut attempt = 0;
        while claimed.contains(&name) {
            name = if attempt == 0 {
                format!("{}_{}", base, cluster_id)
            } else {
                format!("{}_{}_{}", base, cluster_id, attempt)
            };
            attempt += 1;
        }
        claimed.insert(name.clone());
        name
    }

    fn ensure_folder(&self, folder: &Path, report: &mut SyncReport) -> std::io::Result<()> {
        if folder.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(folder)?;
        tracing::info!(folder = %folder.display(), "Created folder");
        report.folders_created.push(folder.to_path_buf());
        Ok(())
    }

    /// Remove managed (non-hidden, top-level) folders that are empty
    fn cleanup_empty_folders(&self) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for folder in self.managed_folders() {
            let is_empty = fs::read_dir(&folder)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                continue;
            }

            match fs::remove_dir(&folder) {
                Ok(()) => {
                    tracing::info!(folder = %folder.display(), "Cleaned up empty folder");
                    removed.push(folder);
                }
                Err(e) => {
                    tracing::warn!(folder = %folder.display(), error = %e, "Failed to remove empty folder");
                }
            }
        }
        removed
    }

    /// Non-hidden direct subdirectories of the root, sorted by name
    fn managed_folders(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();
        folders
    }

    /// Current managed folders and the supported files in each
    pub fn folder_structure(&self) -> Vec<FolderInfo> {
        self.managed_folders()
            .into_iter()
            .map(|folder| {
                let mut files: Vec<String> = fs::read_dir(&folder)
                    .map(|entries| {
                        entries
                            .filter_map(Result::ok)
                            .map(|entry| entry.path())
                            .filter(|path| path.is_file() && has_supported_extension(path, &self.extensions))
                            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                files.sort();

                FolderInfo {
                    name: folder
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    count: files.len(),
                    files,
                    path: folder,
                }
            })
            .collect()
    }
}

/// Destination of `source` inside `folder`, avoiding other files
///
/// Returns `source` itself when it already sits in `folder`.
fn plan_destination(folder: &Path, source: &Path) -> Result<PathBuf, MoveError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| MoveError::NoFileName(source.to_path_buf()))?;

    let mut destination = folder.join(file_name);
    if destination == source || !destination.exists() {
        return Ok(destination);
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    while destination.exists() && destination != source {
        destination = folder.join(format!("{}_{}{}", stem, counter, extension));
        counter += 1;
    }
    Ok(destination)
}

/// Move one file, falling back to copy + delete across filesystems
fn move_file(source: &Path, destination: &Path) -> Result<(), MoveError> {
    if !source.exists() {
        return Err(MoveError::SourceMissing(source.to_path_buf()));
    }

    let io_error = |message: String| MoveError::Io {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        message,
    };

    if let Err(rename_err) = fs::rename(source, destination) {
        tracing::debug!(error = %rename_err, "Rename failed, trying copy");
        fs::copy(source, destination).map_err(|e| io_error(format!("copy failed: {}", e)))?;
        if let Err(e) = fs::remove_file(source) {
            let _ = fs::remove_file(destination);
            return Err(io_error(format!("failed to remove source: {}", e)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn synchronizer(root: &Path) -> FolderSynchronizer {
        FolderSynchronizer::new(root.to_path_buf(), 50, vec!["txt".to_string(), "pdf".to_string()])
    }

    /// Locator that follows moves recorded so far, else the identifier itself
    fn locator(moves: &HashMap<PathBuf, PathBuf>) -> impl Fn(&Path) -> Option<PathBuf> + '_ {
        move |identifier: &Path| {
            let path = moves
                .get(identifier)
                .cloned()
                .unwrap_or_else(|| identifier.to_path_buf());
            path.exists().then_some(path)
        }
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_sync_moves_into_named_folders() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("a.txt");
        let b = root.join("b.txt");
        write(&a, "alpha");
        write(&b, "beta");

        let mut assignments = Assignments::new();
        assignments.insert(a.clone(), 0);
        assignments.insert(b.clone(), NOISE_CLUSTER);
        let mut names = ClusterNames::new();
        names.insert(0, "Topic_X".to_string());

        let moves = HashMap::new();
        let report = synchronizer(root).sync(&assignments, &names, locator(&moves));

        assert_eq!(report.move_count(), 2);
        assert_eq!(report.moved[&a], root.join("Topic_X").join("a.txt"));
        assert_eq!(report.moved[&b], root.join("Uncategorized").join("b.txt"));
        assert!(root.join("Topic_X/a.txt").exists());
        assert!(!a.exists());
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let mut assignments = Assignments::new();
        for (name, cluster) in [("a.txt", 0), ("b.txt", 0), ("c.txt", 1)] {
            let path = root.join(name);
            write(&path, name);
            assignments.insert(path, cluster);
        }
        let mut names = ClusterNames::new();
        names.insert(0, "First".to_string());
        names.insert(1, "Second".to_string());

        let sync = synchronizer(root);
        let mut moves = HashMap::new();
        let first = sync.sync(&assignments, &names, locator(&moves));
        assert_eq!(first.move_count(), 3);
        moves.extend(first.moved.clone());

        let second = sync.sync(&assignments, &names, locator(&moves));
        assert_eq!(second.move_count(), 0);
        assert_eq!(second.unchanged, 3);
        assert!(second.folders_created.is_empty());
        assert!(second.folders_removed.is_empty());
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let existing = root.join("Notes").join("new.txt");
        write(&existing, "already here");
        let incoming = root.join("new.txt");
        write(&incoming, "incoming");

        let mut assignments = Assignments::new();
        assignments.insert(incoming.clone(), 0);
        let mut names = ClusterNames::new();
        names.insert(0, "Notes".to_string());

        let moves = HashMap::new();
        let report = synchronizer(root).sync(&assignments, &names, locator(&moves));

        let placed = root.join("Notes").join("new_1.txt");
        assert_eq!(report.moved[&incoming], placed);
        assert_eq!(fs::read_to_string(&placed).unwrap(), "incoming");
        assert_eq!(fs::read_to_string(&existing).unwrap(), "already here");

        // The suffixed file is recognised as already placed
        let mut moves = HashMap::new();
        moves.insert(incoming.clone(), placed.clone());
        let again = synchronizer(root).sync(&assignments, &names, locator(&moves));
        assert_eq!(again.move_count(), 0);
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn test_missing_source_does_not_abort_batch() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let present = root.join("present.txt");
        write(&present, "here");
        let missing = root.join("missing.txt");

        let mut assignments = Assignments::new();
        assignments.insert(missing.clone(), 0);
        assignments.insert(present.clone(), 0);
        let names = ClusterNames::new();

        let moves = HashMap::new();
        let report = synchronizer(root).sync(&assignments, &names, locator(&moves));

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].identifier, missing);
        assert_eq!(report.moved[&present], root.join("Cluster_0").join("present.txt"));
    }

    #[test]
    fn test_empty_folders_removed_after_reassignment() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("a.txt");
        write(&a, "alpha");

        let mut assignments = Assignments::new();
        assignments.insert(a.clone(), 0);
        let mut names = ClusterNames::new();
        names.insert(0, "Old".to_string());

        let sync = synchronizer(root);
        let mut moves = HashMap::new();
        moves.extend(sync.sync(&assignments, &names, locator(&moves)).moved);

        names.insert(0, "New".to_string());
        let report = sync.sync(&assignments, &names, locator(&moves));

        assert_eq!(report.moved[&a], root.join("New").join("a.txt"));
        assert_eq!(report.folders_removed, vec![root.join("Old")]);
        assert!(!root.join("Old").exists());
    }

    #[test]
    fn test_hidden_folders_are_not_managed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::create_dir_all(root.join("Empty")).unwrap();

        let report = synchronizer(root).sync(&Assignments::new(), &ClusterNames::new(), |_| None);

        assert_eq!(report.folders_removed, vec![root.join("Empty")]);
        assert!(root.join(".cache").exists());
    }

    #[test]
    fn test_duplicate_sanitized_names_are_disambiguated() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("a.txt");
        let b = root.join("b.txt");
        write(&a, "a");
        write(&b, "b");

        let mut assignments = Assignments::new();
        assignments.insert(a.clone(), 0);
        assignments.insert(b.clone(), 1);
        let mut names = ClusterNames::new();
        names.insert(0, "A/B".to_string());
        names.insert(1, "A:B".to_string());

        let moves = HashMap::new();
        let report = synchronizer(root).sync(&assignments, &names, locator(&moves));

        assert_eq!(report.moved[&a], root.join("A_B").join("a.txt"));
        assert_eq!(report.moved[&b], root.join("A_B_1").join("b.txt"));
    }

    #[test]
    fn test_disambiguated_name_never_reuses_a_claimed_folder() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let files: Vec<PathBuf> = ["n.txt", "a.txt", "b.txt"].iter().map(|f| root.join(f)).collect();
        for file in &files {
            write(file, "x");
        }

        let mut assignments = Assignments::new();
        assignments.insert(files[0].clone(), NOISE_CLUSTER);
        assignments.insert(files[1].clone(), 0);
        assignments.insert(files[2].clone(), 1);
        let mut names = ClusterNames::new();
        names.insert(0, "Uncategorized_1".to_string());
        names.insert(1, "Uncategorized".to_string());

        let moves = HashMap::new();
        let report = synchronizer(root).sync(&assignments, &names, locator(&moves));

        assert_eq!(report.moved[&files[0]], root.join("Uncategorized").join("n.txt"));
        assert_eq!(report.moved[&files[1]], root.join("Uncategorized_1").join("a.txt"));
        assert_eq!(report.moved[&files[2]], root.join("Uncategorized_1_1").join("b.txt"));
    }

    #[test]
    fn test_folder_structure_lists_supported_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("Topic/a.txt"), "a");
        write(&root.join("Topic/b.pdf"), "b");
        write(&root.join("Topic/c.png"), "c");
        write(&root.join(".hidden/d.txt"), "d");

        let structure = synchronizer(root).folder_structure();

        assert_eq!(structure.len(), 1);
        assert_eq!(structure[0].name, "Topic");
        assert_eq!(structure[0].files, vec!["a.txt".to_string(), "b.pdf".to_string()]);
        assert_eq!(structure[0].count, 2);
    }
}
