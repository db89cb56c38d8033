//! Dataset module - in-memory repository metadata
//!
//! - record: JSON validation into `RepositoryRecord`
//! - store: `Dataset` with name index and cached statistics
//! - stats: aggregate statistics
//! - vector: embedding index and cosine ranking

mod record;
mod stats;
mod store;
mod vector;

// Re-exports
pub use record::{
    parse_bound, parse_records, parse_timestamp, DateField, MainPaper, RepositoryRecord,
    RepositorySummary, README_EXCERPT_CHARS,
};
pub use stats::{DatasetStatistics, Distribution};
pub use store::Dataset;
pub use vector::{cosine_similarity, EmbeddingIndex, IndexState, SearchResult, VectorEntry};
