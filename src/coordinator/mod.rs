//! Reorganization Coordinator
//!
//! Drives one pipeline pass per tick:
//!
//! ```text
//! Idle -> DrainingEvents -> Indexing -> Clustering -> Naming -> Syncing -> Persisting -> Idle
//! ```
//!
//! Every tick drains and indexes. The remaining phases only run when the
//! batch held a mutating event, on the very first tick, or after pending
//! arrivals were confirmed with [`ReorganizationCoordinator::include_pending`].
//! All engine state is owned here and touched from one thread; the watcher
//! only feeds the event channel.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use thiserror::Error;

use crate::ai::{AnthropicClient, ClusterNamer, KeywordNamer, LlmNamer, NamingError};
use crate::cluster::ClusterAssigner;
use crate::config::{model_cache_dir, ConfigError, EngineConfig, NamingBackend};
use crate::execution::FolderSynchronizer;
use crate::models::{
    fallback_cluster_name, Assignments, ClusterNames, ClusterRecord, EngineState, FileEvent, FileEventKind,
    HistorySnapshot, NOISE_CLUSTER,
};
use crate::services::{ContentExtractor, FileContentExtractor};
use crate::state::{HistoryLog, IdentityStore, StoreError};
use crate::vector::{AddOutcome, EmbeddingError, EmbeddingIndex, FastEmbedder};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("Managed root {path} is unavailable: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    DrainingEvents,
    Indexing,
    Clustering,
    Naming,
    Syncing,
    Persisting,
}

/// Called with identifiers of newly arrived, indexed files
pub type ArrivalHook = Box<dyn Fn(&[PathBuf]) + Send>;

/// Outcome of the indexing phase for one batch
#[derive(Debug, Default)]
struct IndexingOutcome {
    mutating: bool,
    arrivals: Vec<PathBuf>,
}

pub struct ReorganizationCoordinator {
    config: EngineConfig,
    events: Receiver<FileEvent>,
    extractor: Box<dyn ContentExtractor>,
    index: EmbeddingIndex,
    assigner: ClusterAssigner,
    namer: Box<dyn ClusterNamer>,
    synchronizer: FolderSynchronizer,
    store: IdentityStore,
    history: HistoryLog,
    cluster_names: ClusterNames,
    phase: Phase,
    first_run: bool,
    include_requested: bool,
    pending: BTreeSet<PathBuf>,
    arrival_hook: Option<ArrivalHook>,
}

impl ReorganizationCoordinator {
    pub fn new(
        config: EngineConfig,
        events: Receiver<FileEvent>,
        extractor: Box<dyn ContentExtractor>,
        index: EmbeddingIndex,
        namer: Box<dyn ClusterNamer>,
        store: IdentityStore,
        history: HistoryLog,
    ) -> Self {
        let assigner = ClusterAssigner::new(config.cluster_params());
        let synchronizer = FolderSynchronizer::new(
            config.root.clone(),
            config.folder_name_max_len,
            config.normalized_extensions(),
        );

        Self {
            config,
            events,
            extractor,
            index,
            assigner,
            namer,
            synchronizer,
            store,
            history,
            cluster_names: ClusterNames::new(),
            phase: Phase::Idle,
            first_run: true,
            include_requested: false,
            pending: BTreeSet::new(),
            arrival_hook: None,
        }
    }

    /// Build the production engine for `config`: local embeddings, text/PDF
    /// extraction, the configured namer and the root's durable state
    pub fn open(config: EngineConfig, events: Receiver<FileEvent>) -> Result<Self, EngineError> {
        config.validate()?;
        fs::create_dir_all(&config.root).map_err(|source| EngineError::Root {
            path: config.root.clone(),
            source,
        })?;

        let embedder = FastEmbedder::new(config.embedding_model, model_cache_dir())?;
        let index = EmbeddingIndex::new(Box::new(embedder), config.index_config());

        let namer: Box<dyn ClusterNamer> = match config.naming {
            NamingBackend::Keyword => Box::new(KeywordNamer),
            NamingBackend::Anthropic => {
                let client = AnthropicClient::from_api_key(config.anthropic_api_key.as_deref())?;
                Box::new(LlmNamer::new(client))
            }
        };

        let store = IdentityStore::open(&config.root)?;
        let history = HistoryLog::open(&config.root, config.history_limit)?;

        Ok(Self::new(
            config,
            events,
            Box::new(FileContentExtractor),
            index,
            namer,
            store,
            history,
        ))
    }

    pub fn with_arrival_hook(mut self, hook: ArrivalHook) -> Self {
        self.arrival_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    /// Index files that already exist under the root
    ///
    /// The next tick always runs a reorganization pass. Returns how many
    /// files were indexed.
    pub fn bootstrap(&mut self, files: &[PathBuf]) -> usize {
        tracing::info!(files = files.len(), "Processing existing files");
        let mut indexed = 0;
        for path in files {
            let added = match self.tracked_identifier(path) {
                Some(identifier) => self.index_file(&identifier, path),
                None => self.index_new_file(path).is_some(),
            };
            if added {
                indexed += 1;
            }
        }
        self.first_run = true;
        indexed
    }

    /// Run one tick
    ///
    /// Returns whether a reorganization pass ran or new files arrived.
    pub fn process_tick(&mut self) -> bool {
        self.set_phase(Phase::DrainingEvents);
        let batch = self.drain_events();

        self.set_phase(Phase::Indexing);
        let outcome = self.apply_events(&batch);

        if !outcome.arrivals.is_empty() {
            if !self.config.auto_include {
                self.pending.extend(outcome.arrivals.iter().cloned());
            }
            tracing::info!(count = outcome.arrivals.len(), "New files arrived");
            if let Some(hook) = &self.arrival_hook {
                hook(&outcome.arrivals);
            }
        }

        let reorganize = outcome.mutating || self.first_run || self.include_requested;
        if reorganize {
            self.reorganize();
        }

        self.set_phase(Phase::Idle);
        reorganize || !outcome.arrivals.is_empty()
    }

    /// Identifiers indexed but waiting for confirmation
    pub fn pending_arrivals(&self) -> Vec<PathBuf> {
        self.pending.iter().cloned().collect()
    }

    /// Confirm pending arrivals; the next tick reorganizes
    pub fn include_pending(&mut self) {
        tracing::info!(count = self.pending.len(), "Including pending files");
        self.pending.clear();
        self.include_requested = true;
    }

    pub fn current_state(&self) -> EngineState {
        EngineState {
            identifiers: self.index.identifiers().cloned().collect(),
            cluster_stats: self.index.cluster_stats(),
            folder_structure: self.synchronizer.folder_structure(),
            cluster_names: self.cluster_names.clone(),
        }
    }

    /// Clusters of the last pass
    pub fn clusters(&self) -> Vec<ClusterRecord> {
        let assignments: Assignments = self
            .index
            .identifiers()
            .filter_map(|id| self.index.cluster_of(id).map(|c| (id.clone(), c)))
            .collect();
        ClusterRecord::from_assignments(&assignments, &self.cluster_names)
    }

    /// Past passes, oldest first
    pub fn history(&self) -> &[HistorySnapshot] {
        self.history.snapshots()
    }

    pub fn resolve_current_path(&self, identifier: &Path) -> Option<PathBuf> {
        self.store.resolve_current_path(identifier)
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "Phase transition");
            self.phase = phase;
        }
    }

    /// Everything queued since the last tick, with `created` absorbing a
    /// following `modified` of the same path
    fn drain_events(&mut self) -> Vec<FileEvent> {
        let mut batch: Vec<FileEvent> = Vec::new();
        let mut created: HashSet<PathBuf> = HashSet::new();

        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if event.kind == FileEventKind::Modified && created.contains(&event.path) {
                        continue;
                    }
                    if batch.contains(&event) {
                        continue;
                    }
                    if event.kind == FileEventKind::Created {
                        created.insert(event.path.clone());
                    }
                    batch.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Event channel closed");
                    break;
                }
            }
        }

        if !batch.is_empty() {
            tracing::debug!(events = batch.len(), "Drained events");
        }
        batch
    }

    fn apply_events(&mut self, batch: &[FileEvent]) -> IndexingOutcome {
        let mut outcome = IndexingOutcome::default();

        for event in batch {
            match event.kind {
                FileEventKind::Created => {
                    if let Some(identifier) = self.tracked_identifier(&event.path) {
                        self.index_file(&identifier, &event.path);
                        continue;
                    }
                    if let Some(identifier) = self.index_new_file(&event.path) {
                        outcome.arrivals.push(identifier);
                        if self.config.auto_include {
                            outcome.mutating = true;
                        }
                    }
                }
                FileEventKind::Modified => {
                    let indexed = match self.tracked_identifier(&event.path) {
                        Some(identifier) => self.index_file(&identifier, &event.path),
                        None => self.index_new_file(&event.path).is_some(),
                    };
                    if indexed {
                        outcome.mutating = true;
                    }
                }
                FileEventKind::Deleted => {
                    let Some(identifier) = self.tracked_identifier(&event.path) else {
                        tracing::debug!(path = %event.path.display(), "Deleted file was not tracked");
                        continue;
                    };
                    self.index.remove(&identifier);
                    self.store.remove(&identifier);
                    self.pending.remove(&identifier);
                    tracing::info!(path = %event.path.display(), "File deleted");
                    outcome.mutating = true;
                }
                FileEventKind::DirectoryDeleted => {
                    let mut removed = self.index.remove_by_prefix(&event.path);
                    for identifier in self.store.remove_within(&event.path) {
                        self.index.remove(&identifier);
                        removed.push(identifier);
                    }
                    for identifier in &removed {
                        self.pending.remove(identifier);
                    }
                    tracing::info!(
                        directory = %event.path.display(),
                        removed = removed.len(),
                        "Directory deleted"
                    );
                    if !removed.is_empty() {
                        outcome.mutating = true;
                    }
                }
            }
        }

        outcome
    }

    /// Identifier of a file the engine already knows at `path`
    ///
    /// Arrivals that were indexed but never persisted are keyed by their path.
    fn tracked_identifier(&self, path: &Path) -> Option<PathBuf> {
        self.store.identifier_for_path(path).or_else(|| {
            (self.index.contains(path) && !self.store.contains(path)).then(|| path.to_path_buf())
        })
    }

    /// Identifier for a file seen at `path` for the first time
    ///
    /// Normally `path` itself. When `path` is already the identifier of a file
    /// that has since moved, the newcomer gets `<stem>~<n>.<ext>` instead.
    fn new_identifier(&self, path: &Path) -> PathBuf {
        let taken = |candidate: &Path| self.store.contains(candidate) || self.index.contains(candidate);
        if !taken(path) {
            return path.to_path_buf();
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut n = 1;
        loop {
            let candidate = path.with_file_name(format!("{}~{}{}", stem, n, extension));
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Index a file the engine has not seen; returns its identifier if indexed
    fn index_new_file(&mut self, path: &Path) -> Option<PathBuf> {
        let identifier = self.new_identifier(path);
        if !self.index_file(&identifier, path) {
            return None;
        }

        if identifier != path {
            tracing::info!(
                path = %path.display(),
                identifier = %identifier.display(),
                "Path previously belonged to a moved file, tracking under a new identifier"
            );
            // Record the location now so the next pass can find the file
            let preview = self.index.preview(&identifier).unwrap_or_default().to_string();
            self.store.update(&identifier, NOISE_CLUSTER, preview, path.to_path_buf());
        }
        Some(identifier)
    }

    /// Extract and index; `false` when the file was skipped
    fn index_file(&mut self, identifier: &Path, path: &Path) -> bool {
        let content = match self.extractor.extract(path) {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => {
                tracing::debug!(path = %path.display(), "No content extracted, skipping");
                return false;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Extraction failed, skipping");
                return false;
            }
        };

        match self.index.add(identifier, &content) {
            Ok(AddOutcome::Indexed) => {
                tracing::info!(path = %path.display(), "Processed file");
                true
            }
            Ok(AddOutcome::TooShort) => false,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Embedding failed, skipping");
                false
            }
        }
    }

    /// Cluster, name, sync and persist over the whole index
    fn reorganize(&mut self) {
        self.set_phase(Phase::Clustering);
        let assignments = self.assigner.assign(&self.index.entries());
        self.index.set_assignments(&assignments);

        self.first_run = false;
        self.include_requested = false;
        self.pending.clear();

        let names = if assignments.is_empty() {
            tracing::debug!("Nothing to organize");
            ClusterNames::new()
        } else {
            self.set_phase(Phase::Naming);
            self.name_clusters(&assignments)
        };

        self.set_phase(Phase::Syncing);
        let store = &self.store;
        let report = self
            .synchronizer
            .sync(&assignments, &names, |identifier| store.resolve_current_path(identifier));

        self.set_phase(Phase::Persisting);
        for (identifier, cluster_id) in &assignments {
            let current_path = report
                .moved
                .get(identifier)
                .cloned()
                .or_else(|| self.store.resolve_current_path(identifier))
                .unwrap_or_else(|| identifier.clone());
            let preview = self.index.preview(identifier).unwrap_or_default().to_string();
            self.store.update(identifier, *cluster_id, preview, current_path);
        }

        if let Err(e) = self.store.save() {
            tracing::error!(error = %e, "Failed to persist identity store; will retry next pass");
        }
        if !assignments.is_empty() {
            if let Err(e) = self.history.append_snapshot(assignments.clone(), names.clone()) {
                tracing::error!(error = %e, "Failed to persist history");
            }
        }

        self.cluster_names = names;
        tracing::info!(
            files = assignments.len(),
            clusters = self.cluster_names.len(),
            moved = report.move_count(),
            failed = report.failed.len(),
            "Reorganization complete"
        );
    }

    /// Names for every cluster in `assignments`, never failing
    fn name_clusters(&self, assignments: &Assignments) -> ClusterNames {
        let mut names = match self.namer.generate(assignments, &self.index.previews()) {
            Ok(names) => names,
            Err(e) => {
                tracing::error!(error = %e, "Cluster naming failed, using default labels");
                ClusterNames::new()
            }
        };

        let present: BTreeSet<_> = assignments.values().copied().collect();
        names.retain(|cluster_id, _| present.contains(cluster_id));
        for cluster_id in present {
            if cluster_id == NOISE_CLUSTER {
                names.insert(cluster_id, fallback_cluster_name(NOISE_CLUSTER));
            } else {
                names
                    .entry(cluster_id)
                    .or_insert_with(|| fallback_cluster_name(cluster_id));
            }
        }
        names
    }
}
