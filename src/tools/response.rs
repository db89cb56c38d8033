//! Tool response payloads
//!
//! Owned, serializable views. Field names follow what the chat client
//! already expects (`repositories`, `count`, `similarity_score`, ...).

use serde::Serialize;

use crate::dataset::{DatasetStatistics, DateField, RepositoryRecord, RepositorySummary};
use crate::error::{ErrorBody, QueryError, QueryResult};
use crate::query::SortDirection;
use crate::session::{IndexStatus, UploadSummary};

/// Citing DOIs included per repository in citation listings
pub const CITATION_PREVIEW: usize = 5;

/// What a transport sends back: the result object or `{"error": {...}}`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success(ToolOutput),
    Failure { error: ErrorBody },
}

impl From<QueryResult<ToolOutput>> for ToolResponse {
    fn from(result: QueryResult<ToolOutput>) -> Self {
        match result {
            Ok(output) => Self::Success(output),
            Err(e) => Self::failure(&e),
        }
    }
}

impl ToolResponse {
    pub fn failure(error: &QueryError) -> Self {
        Self::Failure {
            error: error.to_body(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Any successful tool result
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Upload(UploadResponse),
    List(ListReposResponse),
    Details(RepoDetailsResponse),
    NameSearch(NameSearchResponse),
    Language(LanguageFilterResponse),
    Sorted(SortedResponse),
    Papers(PaperListResponse),
    Citations(CitationListResponse),
    DateRange(DateRangeResponse),
    Semantic(SemanticSearchResponse),
    Statistics(DatasetStatistics),
    Languages(LanguagesResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub repository_count: usize,
    pub semantic_index: IndexStatus,
}

impl From<UploadSummary> for UploadResponse {
    fn from(summary: UploadSummary) -> Self {
        Self {
            status: "success",
            message: "Data uploaded successfully",
            repository_count: summary.repository_count,
            semantic_index: summary.semantic_index,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListReposResponse {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoDetailsResponse {
    pub found: bool,
    pub repository: RepositoryRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct NameSearchResponse {
    pub query: String,
    pub count: usize,
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageFilterResponse {
    pub language: String,
    pub count: usize,
    pub repositories: Vec<RepositorySummary>,
    pub available_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortedResponse {
    pub sort_field: &'static str,
    pub sort_order: &'static str,
    pub count: usize,
    pub repositories: Vec<RepositorySummary>,
}

impl SortedResponse {
    pub fn new(sort_field: &'static str, direction: SortDirection, repositories: Vec<RepositorySummary>) -> Self {
        Self {
            sort_field,
            sort_order: match direction {
                SortDirection::Asc => "ascending",
                SortDirection::Desc => "descending",
            },
            count: repositories.len(),
            repositories,
        }
    }
}

/// Paper block attached to paper / citation listings
#[derive(Debug, Clone, Serialize)]
pub struct PaperInfo {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub citation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperRepository {
    #[serde(flatten)]
    pub summary: RepositorySummary,
    pub paper: PaperInfo,
}

impl PaperRepository {
    /// `None` for records without a paper
    pub fn from_record(record: &RepositoryRecord, with_citations: bool) -> Option<Self> {
        let paper = record.main_paper.as_ref()?;
        Some(Self {
            summary: RepositorySummary::from(record),
            paper: PaperInfo {
                doi: paper.doi.clone(),
                title: paper.title.clone(),
                journal: paper.journal.clone(),
                citation_count: paper.citations_array.len(),
                citations: with_citations.then(|| {
                    paper
                        .citations_array
                        .iter()
                        .take(CITATION_PREVIEW)
                        .cloned()
                        .collect()
                }),
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperListResponse {
    pub count: usize,
    pub repositories: Vec<PaperRepository>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationListResponse {
    pub min_citations: usize,
    pub count: usize,
    pub repositories: Vec<PaperRepository>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRangeResponse {
    pub date_field: DateField,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub count: usize,
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticResult {
    #[serde(flatten)]
    pub summary: RepositorySummary,
    /// Cosine similarity rounded to 4 decimals
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<SemanticResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguagesResponse {
    pub count: usize,
    pub languages: Vec<String>,
}

/// Summaries of a record list
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a RepositoryRecord>) -> Vec<RepositorySummary> {
    records.into_iter().map(RepositorySummary::from).collect()
}

pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::parse_records;
    use serde_json::json;

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(-1.0), -1.0);
    }

    #[test]
    fn test_paper_repository_flattens_summary() {
        let records = parse_records(&json!([{
            "name": "a/b",
            "stars": 4,
            "mainPaper": {
                "doi": "10.1/x",
                "title": "T",
                "citationsArray": ["1", "2", "3", "4", "5", "6", "7"]
            }
        }]))
        .unwrap();

        let entry = PaperRepository::from_record(&records[0], true).unwrap();
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["name"], "a/b");
        assert_eq!(value["stars"], 4);
        assert_eq!(value["paper"]["citation_count"], 7);
        assert_eq!(value["paper"]["citations"].as_array().unwrap().len(), CITATION_PREVIEW);

        let without = serde_json::to_value(PaperRepository::from_record(&records[0], false).unwrap()).unwrap();
        assert!(without["paper"].get("citations").is_none());
    }

    #[test]
    fn test_failure_shape() {
        let response = ToolResponse::failure(&QueryError::SessionNotInitialized);
        let value = serde_json::to_value(&response).unwrap();

        assert!(response.is_error());
        assert_eq!(value["error"]["kind"], "SessionNotInitializedError");
        assert!(value["error"]["message"].as_str().unwrap().contains("upload_data"));
    }

    #[test]
    fn test_paper_repository_requires_paper() {
        let records = parse_records(&json!([{ "name": "a/b" }])).unwrap();
        assert!(PaperRepository::from_record(&records[0], false).is_none());
    }
}
