//! Embedding Index - in-memory vectors over repository text
//!
//! One vector per record, computed from `RepositoryRecord::semantic_text`.
//! The index is built once per upload and never mutated; a new upload builds
//! a new index.
//!
//! Scores are cosine similarity in [-1.0, 1.0]. Equal scores keep upload order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::error::{QueryError, QueryResult};

use super::record::RepositoryRecord;

// ============================================================================
// Types
// ============================================================================

/// Stored vector for one record
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Record name
    pub name: String,
    /// Position in upload order
    pub position: usize,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

/// Search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Record name
    pub name: String,
    /// Position in upload order
    pub position: usize,
    /// Cosine similarity (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// Semantic index state of a dataset
pub enum IndexState {
    Ready(EmbeddingIndex),
    /// Build failed or no embedder configured; structured queries still work.
    Unavailable(String),
}

impl IndexState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The index, or `EmbeddingUnavailable` with the recorded reason
    pub fn ready(&self) -> QueryResult<&EmbeddingIndex> {
        match self {
            Self::Ready(index) => Ok(index),
            Self::Unavailable(reason) => Err(QueryError::embedding_unavailable(reason.clone())),
        }
    }
}

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// Brute-force cosine index
pub struct EmbeddingIndex {
    entries: Vec<VectorEntry>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Embed every record.
    ///
    /// Fails with `EmbeddingUnavailable` if the provider errors, returns the
    /// wrong number of vectors, returns mixed dimensions, or takes longer
    /// than `timeout`.
    pub async fn build(
        records: &[RepositoryRecord],
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> QueryResult<Self> {
        let texts: Vec<String> = records.iter().map(|r| r.semantic_text()).collect();

        let vectors = match tokio::time::timeout(timeout, embedder.embed_batch(&texts)).await {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => {
                return Err(QueryError::embedding_unavailable(format!(
                    "index build failed: {:#}",
                    e
                )))
            }
            Err(_) => {
                return Err(QueryError::embedding_unavailable(format!(
                    "index build timed out after {:?}",
                    timeout
                )))
            }
        };

        if vectors.len() != records.len() {
            return Err(QueryError::embedding_unavailable(format!(
                "provider returned {} vectors for {} records",
                vectors.len(),
                records.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or_else(|| embedder.dimension());
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(QueryError::embedding_unavailable(format!(
                "inconsistent vector dimension at record {} (expected {}, got {})",
                bad,
                dimension,
                vectors[bad].len()
            )));
        }

        let entries = records
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (record, embedding))| VectorEntry {
                name: record.name.clone(),
                position,
                embedding,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Built semantic index: {} vectors (dimension {}, model {})",
            entries.len(),
            dimension,
            embedder.name()
        );

        Ok(Self {
            entries,
            embedder,
            timeout,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `text` and return the `k` closest records.
    pub async fn query(&self, text: &str, k: usize) -> QueryResult<Vec<SearchResult>> {
        let query_embedding = match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                return Err(QueryError::embedding_unavailable(format!(
                    "query embedding failed: {:#}",
                    e
                )))
            }
            Err(_) => {
                return Err(QueryError::embedding_unavailable(format!(
                    "query embedding timed out after {:?}",
                    self.timeout
                )))
            }
        };

        if query_embedding.len() != self.dimension {
            return Err(QueryError::embedding_unavailable(format!(
                "query vector dimension {} does not match index dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        Ok(self.search(&query_embedding, k))
    }

    /// Rank by cosine similarity against a precomputed query vector.
    ///
    /// `k` is clamped to the number of entries.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<SearchResult> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|entry| SearchResult {
                name: entry.name.clone(),
                position: entry.position,
                similarity: cosine_similarity(&entry.embedding, query_embedding),
            })
            .collect();

        // stable: equal scores stay in upload order
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Cosine similarity, clamped to -1.0 ~ 1.0.
///
/// Returns 0.0 for mismatched lengths, empty input, zero vectors and
/// non-finite results.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================
