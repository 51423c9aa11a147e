//! Embedding Index Module
//!
//! In-memory store of file embeddings and content previews, keyed by the
//! file's stable identifier. Purely in-memory; persistence of identity lives
//! in [`crate::state`].

pub mod embedder;

pub use embedder::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{ClusterId, ClusterStats};
use crate::utils::{path_is_within, truncate_chars};

/// Errors that can occur while indexing
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Limits applied to content before it is embedded or previewed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    /// Only this many leading characters are embedded
    pub max_embed_chars: usize,
    /// Only this many leading characters are kept as preview
    pub preview_chars: usize,
    /// Trimmed content shorter than this is not indexed
    pub min_content_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_embed_chars: 5000,
            preview_chars: 500,
            min_content_chars: 10,
        }
    }
}

/// Result of [`EmbeddingIndex::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Indexed,
    /// Content was below the minimum length; nothing changed
    TooShort,
}

/// A document in the index
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub embedding: Vec<f32>,
    pub preview: String,
}

/// In-memory embedding index
///
/// Keeps insertion order so that clustering over [`EmbeddingIndex::entries`]
/// is deterministic for a fixed sequence of `add` calls. Re-adding an
/// identifier keeps its original position.
pub struct EmbeddingIndex {
    embedder: Box<dyn Embedder>,
    config: IndexConfig,
    order: Vec<PathBuf>,
    documents: HashMap<PathBuf, IndexedDocument>,
    /// Cluster assignment from the last clustering pass
    assignments: HashMap<PathBuf, ClusterId>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Box<dyn Embedder>, config: IndexConfig) -> Self {
        Self {
            embedder,
            config,
            order: Vec::new(),
            documents: HashMap::new(),
            assignments: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn contains(&self, identifier: &Path) -> bool {
        self.documents.contains_key(identifier)
    }

    pub fn embedding(&self, identifier: &Path) -> Option<&[f32]> {
        self.documents.get(identifier).map(|d| d.embedding.as_slice())
    }

    pub fn preview(&self, identifier: &Path) -> Option<&str> {
        self.documents.get(identifier).map(|d| d.preview.as_str())
    }

    /// All identifiers in insertion order
    pub fn identifiers(&self) -> impl Iterator<Item = &PathBuf> {
        self.order.iter()
    }

    /// `(identifier, embedding)` pairs in insertion order
    pub fn entries(&self) -> Vec<(&Path, &[f32])> {
        self.order
            .iter()
            .filter_map(|id| {
                self.documents
                    .get(id)
                    .map(|doc| (id.as_path(), doc.embedding.as_slice()))
            })
            .collect()
    }

    /// identifier -> preview for every indexed file
    pub fn previews(&self) -> HashMap<PathBuf, String> {
        self.documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.preview.clone()))
            .collect()
    }

    /// Embed `content` and store it under `identifier`
    ///
    /// Content whose trimmed length is under the minimum is skipped with a
    /// warning. Re-adding replaces the previous embedding and preview.
    pub fn add(&mut self, identifier: &Path, content: &str) -> Result<AddOutcome, IndexError> {
        if content.trim().chars().count() < self.config.min_content_chars {
            tracing::warn!(path = %identifier.display(), "Content too short, not indexed");
            return Ok(AddOutcome::TooShort);
        }

        let embedding = self
            .embedder
            .embed(truncate_chars(content, self.config.max_embed_chars))?;

        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: embedding.len(),
            });
        }

        let preview = truncate_chars(content, self.config.preview_chars).to_string();
        let previous = self
            .documents
            .insert(identifier.to_path_buf(), IndexedDocument { embedding, preview });
        if previous.is_none() {
            self.order.push(identifier.to_path_buf());
        }

        tracing::debug!(path = %identifier.display(), "Added file to index");
        Ok(AddOutcome::Indexed)
    }

    /// Remove an identifier; no-op if absent
    pub fn remove(&mut self, identifier: &Path) -> Option<IndexedDocument> {
        self.assignments.remove(identifier);
        let removed = self.documents.remove(identifier);
        if removed.is_some() {
            self.order.retain(|id| id != identifier);
            tracing::debug!(path = %identifier.display(), "Removed file from index");
        }
        removed
    }

    /// Remove every identifier located under `directory`
    ///
    /// Matching is by path segment, so `/a/bfile` is not under `/a/b`.
    pub fn remove_by_prefix(&mut self, directory: &Path) -> Vec<PathBuf> {
        let doomed: Vec<PathBuf> = self
            .order
            .iter()
            .filter(|id| path_is_within(id, directory))
            .cloned()
            .collect();

        for identifier in &doomed {
            self.remove(identifier);
        }

        if !doomed.is_empty() {
            tracing::info!(
                directory = %directory.display(),
                removed = doomed.len(),
                "Removed files from index after directory deletion"
            );
        }
        doomed
    }

    /// Replace the cached cluster assignments with the latest pass
    pub fn set_assignments<'a>(&mut self, assignments: impl IntoIterator<Item = (&'a PathBuf, &'a ClusterId)>) {
        self.assignments = assignments
            .into_iter()
            .filter(|(id, _)| self.documents.contains_key(*id))
            .map(|(id, cluster)| (id.clone(), *cluster))
            .collect();
    }

    pub fn cluster_of(&self, identifier: &Path) -> Option<ClusterId> {
        self.assignments.get(identifier).copied()
    }

    /// Count and member names per cluster of the last pass
    pub fn cluster_stats(&self) -> BTreeMap<ClusterId, ClusterStats> {
        let mut stats: BTreeMap<ClusterId, ClusterStats> = BTreeMap::new();
        for identifier in &self.order {
            if let Some(cluster_id) = self.assignments.get(identifier) {
                let entry = stats.entry(*cluster_id).or_default();
                entry.count += 1;
                entry.files.push(
                    identifier
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                );
            }
        }
        stats
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingEmbedder, VocabularyEmbedder};
    use super::*;

    fn test_index() -> EmbeddingIndex {
        EmbeddingIndex::new(
            Box::new(VocabularyEmbedder::new(&["apple", "banana", "cherry"])),
            IndexConfig::default(),
        )
    }

    #[test]
    fn test_add_and_get() {
        let mut index = test_index();
        let outcome = index.add(Path::new("/r/a.txt"), "apple apple banana pie").unwrap();

        assert_eq!(outcome, AddOutcome::Indexed);
        assert_eq!(index.len(), 1);
        assert_eq!(index.embedding(Path::new("/r/a.txt")), Some(&[2.0, 1.0, 0.0][..]));
        assert_eq!(index.preview(Path::new("/r/a.txt")), Some("apple apple banana pie"));
    }

    #[test]
    fn test_add_too_short_is_noop() {
        let mut index = test_index();
        let outcome = index.add(Path::new("/r/a.txt"), "   apple   ").unwrap();

        assert_eq!(outcome, AddOutcome::TooShort);
        assert!(index.is_empty());
    }

    #[test]
    fn test_preview_and_embed_truncation() {
        let config = IndexConfig {
            max_embed_chars: 12,
            preview_chars: 5,
            min_content_chars: 1,
        };
        let mut index = EmbeddingIndex::new(Box::new(VocabularyEmbedder::new(&["apple", "cherry"])), config);
        index.add(Path::new("a"), "apple apple cherry").unwrap();

        // "cherry" falls beyond the embedded prefix
        assert_eq!(index.embedding(Path::new("a")), Some(&[2.0, 0.0][..]));
        assert_eq!(index.preview(Path::new("a")), Some("apple"));
    }

    #[test]
    fn test_re_add_overwrites_and_keeps_order() {
        let mut index = test_index();
        index.add(Path::new("a"), "apple apple apple").unwrap();
        index.add(Path::new("b"), "banana banana banana").unwrap();
        index.add(Path::new("a"), "cherry cherry cherry").unwrap();

        let ids: Vec<&PathBuf> = index.identifiers().collect();
        assert_eq!(ids, vec![&PathBuf::from("a"), &PathBuf::from("b")]);
        assert_eq!(index.embedding(Path::new("a")), Some(&[0.0, 0.0, 3.0][..]));
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let mut index = EmbeddingIndex::new(Box::new(FailingEmbedder), IndexConfig::default());
        let result = index.add(Path::new("a"), "long enough content here");
        assert!(matches!(result, Err(IndexError::Embedding(_))));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_clears_assignment() {
        let mut index = test_index();
        index.add(Path::new("a"), "apple apple apple").unwrap();
        let mut assignments = BTreeMap::new();
        assignments.insert(PathBuf::from("a"), 0);
        index.set_assignments(&assignments);
        assert_eq!(index.cluster_of(Path::new("a")), Some(0));

        assert!(index.remove(Path::new("a")).is_some());
        assert_eq!(index.cluster_of(Path::new("a")), None);
        assert!(index.remove(Path::new("a")).is_none());
    }

    #[test]
    fn test_remove_by_prefix_is_segment_aware() {
        let mut index = test_index();
        index.add(Path::new("root/dir/a.txt"), "apple apple apple").unwrap();
        index.add(Path::new("root/dir/b.txt"), "banana banana banana").unwrap();
        index.add(Path::new("root/dirOther/c.txt"), "cherry cherry cherry").unwrap();

        let removed = index.remove_by_prefix(Path::new("root/dir"));

        assert_eq!(removed.len(), 2);
        assert_eq!(index.len(), 1);
        assert!(index.contains(Path::new("root/dirOther/c.txt")));
    }

    #[test]
    fn test_cluster_stats() {
        let mut index = test_index();
        index.add(Path::new("/r/a.txt"), "apple apple apple").unwrap();
        index.add(Path::new("/r/b.txt"), "apple apple banana").unwrap();
        index.add(Path::new("/r/c.txt"), "cherry cherry cherry").unwrap();

        let mut assignments = BTreeMap::new();
        assignments.insert(PathBuf::from("/r/a.txt"), 0);
        assignments.insert(PathBuf::from("/r/b.txt"), 0);
        assignments.insert(PathBuf::from("/r/c.txt"), -1);
        index.set_assignments(&assignments);

        let stats = index.cluster_stats();
        assert_eq!(stats[&0].count, 2);
        assert_eq!(stats[&0].files, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(stats[&-1].count, 1);
    }
}
