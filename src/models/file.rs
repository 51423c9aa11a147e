use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Cluster identifier produced by the cluster assigner
pub type ClusterId = i32;

/// Reserved cluster id for files that belong to no dense group
pub const NOISE_CLUSTER: ClusterId = -1;

/// Fixed label of the noise cluster
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// identifier -> cluster id for one reorganization pass
pub type Assignments = BTreeMap<PathBuf, ClusterId>;

/// cluster id -> display name for one reorganization pass
pub type ClusterNames = BTreeMap<ClusterId, String>;

/// Label used when no better name is available for a cluster
pub fn fallback_cluster_name(cluster_id: ClusterId) -> String {
    if cluster_id == NOISE_CLUSTER {
        UNCATEGORIZED_LABEL.to_string()
    } else {
        format!("Cluster_{}", cluster_id)
    }
}

/// Durable record of a tracked file
///
/// `identifier` is the path the file was first discovered at and never
/// changes; `current_path` follows the file as the synchronizer moves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable logical key (map key in the state file)
    #[serde(skip)]
    pub identifier: PathBuf,
    /// Embedding mirrored from the index; not persisted
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Bounded content excerpt
    #[serde(default)]
    pub preview: String,
    /// Cluster assignment of the last pass that included this file
    #[serde(rename = "cluster")]
    pub cluster_id: ClusterId,
    /// Latest known physical location (absent in older state files)
    #[serde(default)]
    pub current_path: Option<PathBuf>,
    /// When this record was last touched by a reorganization pass
    #[serde(rename = "updated")]
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(identifier: PathBuf, cluster_id: ClusterId, preview: String, current_path: PathBuf) -> Self {
        Self {
            identifier,
            embedding: None,
            preview,
            cluster_id,
            current_path: Some(current_path),
            updated_at: Utc::now(),
        }
    }
}

/// A cluster as derived from one pass; regenerated every time, never patched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub cluster_id: ClusterId,
    pub name: String,
    pub members: Vec<PathBuf>,
}

impl ClusterRecord {
    /// Group assignments into clusters, naming each from `names`
    pub fn from_assignments(assignments: &Assignments, names: &ClusterNames) -> Vec<ClusterRecord> {
        let mut grouped: BTreeMap<ClusterId, Vec<PathBuf>> = BTreeMap::new();
        for (identifier, cluster_id) in assignments {
            grouped.entry(*cluster_id).or_default().push(identifier.clone());
        }

        grouped
            .into_iter()
            .map(|(cluster_id, members)| ClusterRecord {
                cluster_id,
                name: names
                    .get(&cluster_id)
                    .cloned()
                    .unwrap_or_else(|| fallback_cluster_name(cluster_id)),
                members,
            })
            .collect()
    }
}

/// One entry of the reorganization history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub timestamp: DateTime<Utc>,
    pub assignments: Assignments,
    pub names: ClusterNames,
}

impl HistorySnapshot {
    pub fn new(assignments: Assignments, names: ClusterNames) -> Self {
        Self {
            timestamp: Utc::now(),
            assignments,
            names,
        }
    }
}

/// Per-cluster statistics derived from the index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub count: usize,
    /// Base names of member files
    pub files: Vec<String>,
}

/// A managed folder under the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<String>,
    pub count: usize,
}

/// Snapshot of the engine exposed to callers (e.g. an API layer)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub identifiers: Vec<PathBuf>,
    pub cluster_stats: BTreeMap<ClusterId, ClusterStats>,
    pub folder_structure: Vec<FolderInfo>,
    pub cluster_names: ClusterNames,
}
