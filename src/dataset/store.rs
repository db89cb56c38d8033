//! Dataset Store - records of one upload plus derived structures
//!
//! A `Dataset` is built completely (name index, statistics, semantic index)
//! before anyone can see it, and is immutable afterwards. Replacing the
//! session's dataset means building a new one and swapping the reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::error::{QueryError, QueryResult};

use super::record::RepositoryRecord;
use super::stats::DatasetStatistics;
use super::vector::{EmbeddingIndex, IndexState};

// ============================================================================
// Dataset
// ============================================================================

/// Records in upload order, a name index, cached statistics and the
/// semantic index state.
pub struct Dataset {
    records: Vec<RepositoryRecord>,
    by_name: HashMap<String, usize>,
    statistics: DatasetStatistics,
    index: IndexState,
}

impl Dataset {
    /// Build structured indices only; the semantic index is left unavailable.
    ///
    /// Fails with `Validation` on duplicate names.
    pub fn new(records: Vec<RepositoryRecord>) -> QueryResult<Self> {
        let mut by_name = HashMap::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            if let Some(first) = by_name.insert(lookup_key(&record.name).to_string(), position) {
                return Err(QueryError::validation(format!(
                    "Record {}: duplicate name '{}' (first seen at record {})",
                    position, record.name, first
                )));
            }
        }

        let statistics = DatasetStatistics::compute(&records);

        Ok(Self {
            records,
            by_name,
            statistics,
            index: IndexState::Unavailable("semantic index not built".to_string()),
        })
    }

    /// Build structured indices and, if an embedder is given, the semantic index.
    ///
    /// A semantic index failure does not fail the load: the dataset comes back
    /// with `IndexState::Unavailable` and structured queries keep working.
    pub async fn load(
        records: Vec<RepositoryRecord>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        timeout: Duration,
    ) -> QueryResult<Self> {
        let mut dataset = Self::new(records)?;

        dataset.index = match embedder {
            None => IndexState::Unavailable("no embedding provider configured".to_string()),
            Some(embedder) => match EmbeddingIndex::build(&dataset.records, embedder, timeout).await {
                Ok(index) => IndexState::Ready(index),
                Err(e) => {
                    tracing::warn!("Semantic search disabled for this dataset: {}", e);
                    IndexState::Unavailable(e.to_string())
                }
            },
        };

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact lookup. Case-sensitive; surrounding whitespace is ignored, the
    /// same normalization applied to names at load time.
    pub fn get(&self, name: &str) -> QueryResult<&RepositoryRecord> {
        self.by_name
            .get(lookup_key(name))
            .map(|&position| &self.records[position])
            .ok_or_else(|| QueryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Contiguous slice in upload order. Out-of-range input gives an empty slice.
    pub fn list(&self, offset: usize, limit: usize) -> &[RepositoryRecord] {
        let start = offset.min(self.records.len());
        let end = start + limit.min(self.records.len() - start);
        &self.records[start..end]
    }

    /// All records in upload order
    pub fn all(&self) -> &[RepositoryRecord] {
        &self.records
    }

    /// Upload position of a record name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(lookup_key(name)).copied()
    }

    pub fn statistics(&self) -> &DatasetStatistics {
        &self.statistics
    }

    pub fn index(&self) -> &IndexState {
        &self.index
    }
}

fn lookup_key(name: &str) -> &str {
    name.trim()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::parse_records;
    use crate::embedding::HashingEmbedding;
    use serde_json::json;

    fn sample() -> Vec<RepositoryRecord> {
        parse_records(&json!([
            { "name": "owner/alpha", "stars": 1 },
            { "name": "owner/beta", "stars": 2 },
            { "name": "owner/gamma", "stars": 3 },
            { "name": "owner/delta", "stars": 4 },
            { "name": "owner/epsilon", "stars": 5 }
        ]))
        .unwrap()
    }

    #[test]
    fn test_get_is_case_sensitive() {
        let dataset = Dataset::new(sample()).unwrap();

        let record = dataset.get("owner/gamma").unwrap();
        assert_eq!(record.stars, 3);
        assert_eq!(record, &sample()[2]);

        assert_eq!(dataset.get("  owner/gamma ").unwrap().stars, 3);

        let err = dataset.get("Owner/Gamma").unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
        assert!(dataset.get("owner/zeta").is_err());
    }

    #[test]
    fn test_list_length_property() {
        let dataset = Dataset::new(sample()).unwrap();
        let total = dataset.len();
        let names: Vec<&str> = dataset.all().iter().map(|r| r.name.as_str()).collect();

        for offset in 0..8 {
            for limit in 0..8 {
                let page = dataset.list(offset, limit);
                let expected = limit.min(total.saturating_sub(offset));
                assert_eq!(page.len(), expected, "offset={} limit={}", offset, limit);

                let page_names: Vec<&str> = page.iter().map(|r| r.name.as_str()).collect();
                if expected > 0 {
                    assert_eq!(page_names, names[offset..offset + expected].to_vec());
                }
            }
        }

        assert!(dataset.list(usize::MAX, usize::MAX).is_empty());
        assert_eq!(dataset.list(3, usize::MAX).len(), 2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let records = parse_records(&json!([
            { "name": "a/b" },
            { "name": "c/d" },
            { "name": " a/b " }
        ]))
        .unwrap();

        let err = Dataset::new(records).err().unwrap();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("Record 2"));
        assert!(err.to_string().contains("record 0"));
    }

    #[test]
    fn test_statistics_cached() {
        let dataset = Dataset::new(sample()).unwrap();
        assert_eq!(dataset.statistics().total_count, 5);
        assert_eq!(dataset.statistics().total_stars, 15);
        assert_eq!(dataset.position("owner/delta"), Some(3));
    }

    #[tokio::test]
    async fn test_load_without_embedder_keeps_structured_queries() {
        let dataset = Dataset::load(sample(), None, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!dataset.index().is_ready());
        assert_eq!(dataset.len(), 5);
        assert!(dataset.get("owner/beta").is_ok());
    }

    #[tokio::test]
    async fn test_load_with_embedder_builds_index() {
        let dataset = Dataset::load(
            sample(),
            Some(Arc::new(HashingEmbedding::default())),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let index = dataset.index().ready().unwrap();
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::new(Vec::new()).unwrap();
        assert!(dataset.is_empty());
        assert!(dataset.list(0, 10).is_empty());
        assert_eq!(dataset.statistics().total_count, 0);
    }
}
