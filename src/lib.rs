//! repo-query - query tools over repository metadata
//!
//! A session holds one uploaded dataset of repository records and answers
//! structured queries (lookup, filter, sort, date range, statistics) plus
//! embedding-based semantic search over it.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod query;
pub mod session;
pub mod tools;

// Re-exports
pub use config::{Config, ProviderKind};
pub use dataset::{
    parse_records, Dataset, DatasetStatistics, DateField, Distribution, EmbeddingIndex, IndexState,
    MainPaper, RepositoryRecord, RepositorySummary,
};
pub use embedding::{create_embedder, EmbeddingProvider, HashingEmbedding, OpenAiEmbedding};
pub use error::{ErrorBody, QueryError, QueryResult};
pub use query::{QueryEngine, SemanticHit, SortDirection, SortField};
pub use session::{IndexStatus, Session, UploadSummary};
pub use tools::{dispatch, handle, tool_definitions, ToolCall, ToolRequest, ToolResponse};
