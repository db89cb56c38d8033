//! Session Lifecycle - one live dataset per session
//!
//! A `Session` is an explicit context object: nothing here is process-global,
//! so any number of sessions can share a process.
//!
//! Uploads build the replacement `Dataset` (including its semantic index)
//! without holding any lock, then publish it with a single pointer swap.
//! Readers take an `Arc` snapshot and never observe a half-built dataset.
//!
//! Each upload takes a generation ticket when it starts. When uploads overlap,
//! the most recently started one wins: an older upload that finishes later is
//! discarded instead of overwriting newer data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_EMBEDDING_TIMEOUT_SECS};
use crate::dataset::{parse_records, Dataset, IndexState};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{QueryError, QueryResult};

// ============================================================================
// Types
// ============================================================================

/// Semantic index status reported after an upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexStatus {
    Ready { vectors: usize },
    Unavailable { reason: String },
}

impl From<&IndexState> for IndexStatus {
    fn from(state: &IndexState) -> Self {
        match state {
            IndexState::Ready(index) => Self::Ready {
                vectors: index.len(),
            },
            IndexState::Unavailable(reason) => Self::Unavailable {
                reason: reason.clone(),
            },
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSummary {
    pub repository_count: usize,
    pub semantic_index: IndexStatus,
}

// ============================================================================
// Session
// ============================================================================

/// Live dataset and the generation that published it
#[derive(Default)]
struct Live {
    generation: u64,
    dataset: Option<Arc<Dataset>>,
}

/// One client's interaction scope
pub struct Session {
    id: Uuid,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    build_timeout: Duration,
    generations: AtomicU64,
    current: RwLock<Live>,
}

impl Session {
    /// New empty session; `None` disables semantic search.
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedder,
            build_timeout: Duration::from_secs(DEFAULT_EMBEDDING_TIMEOUT_SECS),
            generations: AtomicU64::new(0),
            current: RwLock::new(Live::default()),
        }
    }

    /// Set the bound on semantic index builds
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Session with the embedder selected by `config`.
    ///
    /// An embedder that cannot be created only disables semantic search.
    pub fn from_config(config: &Config) -> Self {
        let embedder = match create_embedder(config) {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                tracing::warn!("Embedding provider unavailable, semantic search disabled: {:#}", e);
                None
            }
        };

        Self::new(embedder).with_build_timeout(config.embedding_timeout)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Validate `raw`, build a new dataset and make it the live one.
    ///
    /// On validation failure the previous dataset stays live. If a later
    /// upload (or `clear`) has already published, this dataset is dropped.
    pub async fn upload(&self, raw: &Value) -> QueryResult<UploadSummary> {
        let generation = self.next_generation();

        let records = parse_records(raw)?;
        let dataset = Dataset::load(records, self.embedder.clone(), self.build_timeout).await?;

        let summary = UploadSummary {
            repository_count: dataset.len(),
            semantic_index: IndexStatus::from(dataset.index()),
        };

        {
            let mut live = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if live.generation > generation {
                tracing::info!(
                    session = %self.id,
                    "Discarding upload {} superseded by upload {}",
                    generation,
                    live.generation
                );
                return Ok(summary);
            }
            *live = Live {
                generation,
                dataset: Some(Arc::new(dataset)),
            };
        }

        tracing::info!(
            session = %self.id,
            "Loaded {} repositories (semantic index: {})",
            summary.repository_count,
            if matches!(summary.semantic_index, IndexStatus::Ready { .. }) { "ready" } else { "unavailable" }
        );

        Ok(summary)
    }

    /// Read a JSON dataset file and upload it
    pub async fn upload_file(&self, path: &std::path::Path) -> Result<UploadSummary> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
        Ok(self.upload(&value).await?)
    }

    /// Snapshot of the live dataset
    pub fn dataset(&self) -> QueryResult<Arc<Dataset>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dataset
            .clone()
            .ok_or(QueryError::SessionNotInitialized)
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dataset
            .is_some()
    }

    /// Drop the live dataset (session end)
    pub fn clear(&self) {
        let generation = self.next_generation();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Live {
            generation,
            dataset: None,
        };
        tracing::debug!(session = %self.id, "Session cleared");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::query::QueryEngine;
    use async_trait::async_trait;
    use serde_json::json;

    struct DownEmbedding;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedding {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("service unavailable")
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    /// Slow for any text mentioning "slow"
    struct GatedEmbedding;

    #[async_trait]
    impl EmbeddingProvider for GatedEmbedding {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            if text.contains("slow") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn hashing_session() -> Session {
        Session::new(Some(Arc::new(HashingEmbedding::default())))
    }

    #[test]
    fn test_queries_before_upload_fail() {
        let session = hashing_session();
        assert!(!session.is_loaded());
        assert_eq!(
            session.dataset().err().unwrap(),
            QueryError::SessionNotInitialized
        );
    }

    #[tokio::test]
    async fn test_upload_reports_count_and_index() {
        let session = hashing_session();
        let summary = session
            .upload(&json!([{ "name": "a/b" }, { "name": "c/d" }]))
            .await
            .unwrap();

        assert_eq!(summary.repository_count, 2);
        assert_eq!(summary.semantic_index, IndexStatus::Ready { vectors: 2 });
        assert_eq!(session.dataset().unwrap().statistics().total_count, 2);
    }

    #[tokio::test]
    async fn test_upload_replaces_wholesale() {
        let session = hashing_session();
        session
            .upload(&json!([{ "name": "old/one" }, { "name": "old/two" }]))
            .await
            .unwrap();
        let before = session.dataset().unwrap();

        session.upload(&json!([{ "name": "new/one" }])).await.unwrap();
        let after = session.dataset().unwrap();

        assert_eq!(after.len(), 1);
        assert!(after.get("old/one").is_err());

        // an in-flight snapshot keeps the dataset it started with
        assert_eq!(before.len(), 2);
        assert!(before.get("old/one").is_ok());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_dataset() {
        let session = hashing_session();
        session.upload(&json!([{ "name": "keep/me" }])).await.unwrap();

        let err = session
            .upload(&json!([{ "name": "fine" }, { "stars": 3 }]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(session.dataset().unwrap().get("keep/me").is_ok());
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades_only_semantic_search() {
        let session = Session::new(Some(Arc::new(DownEmbedding)));
        let summary = session
            .upload(&json!([{ "name": "a/b", "stars": 1 }]))
            .await
            .unwrap();

        match summary.semantic_index {
            IndexStatus::Unavailable { reason } => assert!(reason.contains("service unavailable")),
            other => panic!("expected unavailable index, got {:?}", other),
        }

        let dataset = session.dataset().unwrap();
        let engine = QueryEngine::new(&dataset);
        assert_eq!(engine.list_repos(0, 10).len(), 1);
        assert_eq!(
            engine.semantic_search("anything", 3).await.unwrap_err().kind(),
            "EmbeddingUnavailableError"
        );
    }

    #[tokio::test]
    async fn test_upload_twice_is_deterministic() {
        let session = hashing_session();
        let data = json!([
            { "name": "a", "stars": 5, "language": "C" },
            { "name": "b", "stars": 9, "language": "C", "mainPaper": { "citationsArray": ["x"] } }
        ]);

        session.upload(&data).await.unwrap();
        let first = session.dataset().unwrap().statistics().clone();
        session.upload(&data).await.unwrap();
        let second = session.dataset().unwrap().statistics().clone();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let one = hashing_session();
        let two = hashing_session();
        one.upload(&json!([{ "name": "only/in-one" }])).await.unwrap();

        assert!(one.is_loaded());
        assert!(!two.is_loaded());
        assert_ne!(one.id(), two.id());
    }

    #[tokio::test]
    async fn test_overlapping_uploads_newest_start_wins() {
        let session = Session::new(Some(Arc::new(GatedEmbedding)));
        let older = json!([{ "name": "slow/older" }]);
        let newer = json!([{ "name": "fast/newer" }]);

        let (first, second) = tokio::join!(session.upload(&older), session.upload(&newer));
        assert!(first.is_ok());
        assert!(second.is_ok());

        let dataset = session.dataset().unwrap();
        assert!(dataset.get("fast/newer").is_ok());
        assert!(dataset.get("slow/older").is_err());
    }

    #[tokio::test]
    async fn test_upload_overlapping_clear_is_discarded() {
        let session = Session::new(Some(Arc::new(GatedEmbedding)));
        let data = json!([{ "name": "slow/one" }]);

        let (uploaded, _) = tokio::join!(session.upload(&data), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.clear();
        });

        assert!(uploaded.is_ok());
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn test_upload_with_huge_star_counts() {
        let session = hashing_session();
        session
            .upload(&json!([
                { "name": "a", "stars": u64::MAX },
                { "name": "b", "stars": 1 }
            ]))
            .await
            .unwrap();

        let dataset = session.dataset().unwrap();
        assert_eq!(dataset.statistics().total_stars, u128::from(u64::MAX) + 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let session = hashing_session();
        session.upload(&json!([{ "name": "a" }])).await.unwrap();
        session.clear();
        assert!(session.dataset().is_err());
    }

    #[tokio::test]
    async fn test_upload_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("repos.json");
        std::fs::write(&path, r#"[{"name": "f/ile", "stars": 2}]"#).unwrap();

        let session = Session::new(None);
        let summary = session.upload_file(&path).await.unwrap();
        assert_eq!(summary.repository_count, 1);
        assert!(matches!(summary.semantic_index, IndexStatus::Unavailable { .. }));

        assert!(session.upload_file(&dir.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn test_from_config_hashing() {
        let session = Session::from_config(&Config::default());
        assert!(session.embedder.is_some());
    }
}
