//! Query errors
//!
//! Every failure the query core can report to a caller. The tool layer turns
//! these into `{"error": {"kind", "message"}}` objects, so `kind()` strings are
//! part of the external contract and must stay stable.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the dataset store, the embedding index and the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Malformed upload data or query arguments
    #[error("{0}")]
    Validation(String),

    /// Unknown repository name
    #[error("Repository '{name}' not found. Use search_by_name to find repositories with similar names")]
    NotFound { name: String },

    /// A query arrived before any dataset was uploaded
    #[error("No data loaded. Call upload_data first to upload the JSON data")]
    SessionNotInitialized,

    /// Semantic index could not be built or queried
    #[error("Semantic search unavailable: {0}")]
    EmbeddingUnavailable(String),
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn embedding_unavailable(msg: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(msg.into())
    }

    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::SessionNotInitialized => "SessionNotInitializedError",
            Self::EmbeddingUnavailable(_) => "EmbeddingUnavailableError",
        }
    }

    /// Structured form: `{"kind": ..., "message": ...}`
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serialized error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(QueryError::validation("x").kind(), "ValidationError");
        assert_eq!(
            QueryError::NotFound { name: "a/b".into() }.kind(),
            "NotFoundError"
        );
        assert_eq!(
            QueryError::SessionNotInitialized.kind(),
            "SessionNotInitializedError"
        );
        assert_eq!(
            QueryError::embedding_unavailable("down").kind(),
            "EmbeddingUnavailableError"
        );
    }

    #[test]
    fn test_not_found_message_suggests_search() {
        let body = QueryError::NotFound { name: "x/y".into() }.to_body();
        assert!(body.message.contains("x/y"));
        assert!(body.message.contains("search_by_name"));
    }
}
