//! Embedding backends
//!
//! The index only needs "text in, fixed-length vector out"; [`Embedder`] is that
//! seam. [`FastEmbedder`] runs a local fastembed model (downloaded on first use).

use fastembed::{InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Error type for embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

/// Produces fixed-length embeddings for text
pub trait Embedder: Send {
    /// Embed one piece of text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder produces
    fn dimensions(&self) -> usize;
}

/// Supported embedding models (wrapper for fastembed::EmbeddingModel)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingModelKind {
    /// All-MiniLM-L6-v2: Fast, good quality, 384 dimensions
    #[default]
    AllMiniLmL6V2,
    /// BGE-Small-EN-v1.5: Compact, English-focused
    BgeSmallEnV15,
}

impl EmbeddingModelKind {
    /// Convert to fastembed's EmbeddingModel enum
    pub fn to_fastembed_model(self) -> fastembed::EmbeddingModel {
        match self {
            EmbeddingModelKind::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            EmbeddingModelKind::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
        }
    }
}

/// Local fastembed-backed embedder
pub struct FastEmbedder {
    model: TextEmbedding,
    kind: EmbeddingModelKind,
    dimensions: usize,
}

impl FastEmbedder {
    /// Load the model, caching it under `cache_dir` when given
    ///
    /// Note: This downloads the model on first use (~100MB for AllMiniLmL6V2)
    pub fn new(kind: EmbeddingModelKind, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let mut options = InitOptions::new(kind.to_fastembed_model()).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            std::fs::create_dir_all(&dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create model cache {}: {}", dir.display(), e))
            })?;
            options = options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(options).map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // Probe dimensions with a throwaway embedding
        let dimensions = model
            .embed(vec!["probe"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))?;

        tracing::info!(model = ?kind, dimensions, "Embedding model loaded");

        Ok(Self {
            model,
            kind,
            dimensions,
        })
    }

    pub fn kind(&self) -> EmbeddingModelKind {
        self.kind
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Compute L2 norm of a vector
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1]; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// Cosine distance `1 - cos(a, b)`; 1.0 when either vector has zero norm
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
