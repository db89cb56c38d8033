//! Tool surface - named operations callable by a chat client
//!
//! A request is `{"tool": "<name>", "arguments": {...}}`. Arguments are
//! parsed into typed structs (with the documented defaults), run against the
//! session's live dataset, and answered with a `ToolResponse`.

mod response;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::dataset::{Dataset, DateField};
use crate::error::{QueryError, QueryResult};
use crate::query::{QueryEngine, SortDirection};
use crate::session::Session;

pub use response::*;

// ============================================================================
// Requests
// ============================================================================

/// Wire envelope of one tool call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

fn default_list_limit() -> usize {
    20
}

fn default_sort_limit() -> usize {
    10
}

fn default_min_citations() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadDataArgs {
    #[serde(alias = "json_data")]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListReposArgs {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoDetailsArgs {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameSearchArgs {
    pub query: String,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageArgs {
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortArgs {
    #[serde(default)]
    pub direction: Option<SortDirection>,
    /// Boolean spelling of `direction`
    #[serde(default)]
    pub ascending: Option<bool>,
    #[serde(default = "default_sort_limit")]
    pub limit: usize,
}

impl SortArgs {
    /// `direction` wins over `ascending`; descending when neither is given
    pub fn direction(&self) -> SortDirection {
        self.direction
            .or(self.ascending.map(|asc| if asc { SortDirection::Asc } else { SortDirection::Desc }))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationsArgs {
    #[serde(default = "default_min_citations")]
    pub min_citations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeArgs {
    #[serde(default, alias = "start_date")]
    pub start: Option<String>,
    #[serde(default, alias = "end_date")]
    pub end: Option<String>,
    #[serde(default)]
    pub date_field: DateField,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchArgs {
    pub query: String,
    #[serde(default = "default_sort_limit")]
    pub limit: usize,
}

/// A parsed tool call
#[derive(Debug, Clone)]
pub enum ToolCall {
    UploadData(UploadDataArgs),
    Query(QueryCall),
}

/// Calls that read the live dataset
#[derive(Debug, Clone)]
pub enum QueryCall {
    ListRepos(ListReposArgs),
    GetRepoDetails(RepoDetailsArgs),
    SearchByName(NameSearchArgs),
    FilterByLanguage(LanguageArgs),
    SortByStars(SortArgs),
    SortByForks(SortArgs),
    GetReposWithPaper,
    GetReposWithCitations(CitationsArgs),
    GetReposByDateRange(DateRangeArgs),
    SemanticSearch(SemanticSearchArgs),
    GetStatistics,
    GetAvailableLanguages,
}

impl ToolCall {
    /// Build a call from a tool name and its JSON arguments.
    ///
    /// `null` arguments mean "all defaults". For `upload_data` a bare array is
    /// taken as the dataset itself.
    pub fn parse(name: &str, arguments: Value) -> QueryResult<Self> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            Value::Array(_) if name == "upload_data" => json!({ "data": arguments }),
            other => other,
        };

        let query = match name {
            "upload_data" => return Ok(Self::UploadData(args(name, arguments)?)),
            "list_repos" => QueryCall::ListRepos(args(name, arguments)?),
            "get_repo_details" => QueryCall::GetRepoDetails(args(name, arguments)?),
            "search_by_name" => QueryCall::SearchByName(args(name, arguments)?),
            "filter_by_language" => QueryCall::FilterByLanguage(args(name, arguments)?),
            "sort_by_stars" => QueryCall::SortByStars(args(name, arguments)?),
            "sort_by_forks" => QueryCall::SortByForks(args(name, arguments)?),
            "get_repos_with_paper" => QueryCall::GetReposWithPaper,
            "get_repos_with_citations" => QueryCall::GetReposWithCitations(args(name, arguments)?),
            "get_repos_by_date_range" => QueryCall::GetReposByDateRange(args(name, arguments)?),
            "semantic_search" => QueryCall::SemanticSearch(args(name, arguments)?),
            "get_statistics" => QueryCall::GetStatistics,
            "get_available_languages" => QueryCall::GetAvailableLanguages,
            unknown => {
                return Err(QueryError::validation(format!(
                    "Unknown tool '{}'. Available tools: {}",
                    unknown,
                    TOOL_NAMES.join(", ")
                )))
            }
        };

        Ok(Self::Query(query))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadData(_) => "upload_data",
            Self::Query(query) => query.name(),
        }
    }
}

impl QueryCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListRepos(_) => "list_repos",
            Self::GetRepoDetails(_) => "get_repo_details",
            Self::SearchByName(_) => "search_by_name",
            Self::FilterByLanguage(_) => "filter_by_language",
            Self::SortByStars(_) => "sort_by_stars",
            Self::SortByForks(_) => "sort_by_forks",
            Self::GetReposWithPaper => "get_repos_with_paper",
            Self::GetReposWithCitations(_) => "get_repos_with_citations",
            Self::GetReposByDateRange(_) => "get_repos_by_date_range",
            Self::SemanticSearch(_) => "semantic_search",
            Self::GetStatistics => "get_statistics",
            Self::GetAvailableLanguages => "get_available_languages",
        }
    }
}

fn args<T: DeserializeOwned>(tool: &str, arguments: Value) -> QueryResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| QueryError::validation(format!("Invalid arguments for {}: {}", tool, e)))
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run one call against the session
pub async fn dispatch(session: &Session, call: ToolCall) -> QueryResult<ToolOutput> {
    match call {
        ToolCall::UploadData(args) => {
            let summary = session.upload(&args.data).await?;
            Ok(ToolOutput::Upload(summary.into()))
        }
        ToolCall::Query(query) => {
            let dataset = session.dataset()?;
            run_query(&dataset, query).await
        }
    }
}

/// Answer a read-only call from one dataset snapshot
pub async fn run_query(dataset: &Dataset, call: QueryCall) -> QueryResult<ToolOutput> {
    let engine = QueryEngine::new(dataset);

    let output = match call {
        QueryCall::ListRepos(args) => ToolOutput::List(ListReposResponse {
            total: dataset.len(),
            offset: args.offset,
            limit: args.limit,
            repositories: summarize(engine.list_repos(args.offset, args.limit)),
        }),

        QueryCall::GetRepoDetails(args) => ToolOutput::Details(RepoDetailsResponse {
            found: true,
            repository: engine.get_repo_details(&args.name)?.clone(),
        }),

        QueryCall::SearchByName(args) => {
            let repositories = summarize(engine.search_by_name(&args.query, args.limit));
            ToolOutput::NameSearch(NameSearchResponse {
                query: args.query,
                count: repositories.len(),
                repositories,
            })
        }

        QueryCall::FilterByLanguage(args) => {
            let repositories = summarize(engine.filter_by_language(&args.language));
            ToolOutput::Language(LanguageFilterResponse {
                language: args.language,
                count: repositories.len(),
                repositories,
                available_languages: engine.get_available_languages().to_vec(),
            })
        }

        QueryCall::SortByStars(args) => {
            let direction = args.direction();
            let repositories = summarize(engine.sort_by_stars(direction, args.limit));
            ToolOutput::Sorted(SortedResponse::new("stars", direction, repositories))
        }

        QueryCall::SortByForks(args) => {
            let direction = args.direction();
            let repositories = summarize(engine.sort_by_forks(direction, args.limit));
            ToolOutput::Sorted(SortedResponse::new("forks", direction, repositories))
        }

        QueryCall::GetReposWithPaper => {
            let repositories: Vec<PaperRepository> = engine
                .get_repos_with_paper()
                .into_iter()
                .filter_map(|r| PaperRepository::from_record(r, false))
                .collect();
            ToolOutput::Papers(PaperListResponse {
                count: repositories.len(),
                repositories,
            })
        }

        QueryCall::GetReposWithCitations(args) => {
            let repositories: Vec<PaperRepository> = engine
                .get_repos_with_citations(args.min_citations)
                .into_iter()
                .filter_map(|r| PaperRepository::from_record(r, true))
                .collect();
            ToolOutput::Citations(CitationListResponse {
                min_citations: args.min_citations.max(1),
                count: repositories.len(),
                repositories,
            })
        }

        QueryCall::GetReposByDateRange(args) => {
            let repositories = summarize(engine.get_repos_by_date_range(
                args.start.as_deref(),
                args.end.as_deref(),
                args.date_field,
            )?);
            ToolOutput::DateRange(DateRangeResponse {
                date_field: args.date_field,
                start_date: args.start,
                end_date: args.end,
                count: repositories.len(),
                repositories,
            })
        }

        QueryCall::SemanticSearch(args) => {
            let results: Vec<SemanticResult> = engine
                .semantic_search(&args.query, args.limit)
                .await?
                .into_iter()
                .map(|hit| SemanticResult {
                    summary: hit.record.into(),
                    similarity_score: round_score(hit.score),
                })
                .collect();
            ToolOutput::Semantic(SemanticSearchResponse {
                query: args.query,
                count: results.len(),
                results,
            })
        }

        QueryCall::GetStatistics => ToolOutput::Statistics(dataset.statistics().clone()),

        QueryCall::GetAvailableLanguages => {
            let languages = engine.get_available_languages().to_vec();
            ToolOutput::Languages(LanguagesResponse {
                count: languages.len(),
                languages,
            })
        }
    };

    Ok(output)
}

/// Parse, run and wrap one request. Never fails; errors become `{"error": ...}`.
pub async fn handle(session: &Session, request: ToolRequest) -> ToolResponse {
    let result = match ToolCall::parse(&request.tool, request.arguments) {
        Ok(call) => dispatch(session, call).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        tracing::debug!(session = %session.id(), tool = %request.tool, "Tool call failed: {}", e);
    }

    result.into()
}

// ============================================================================
// Tool catalogue
// ============================================================================

pub const TOOL_NAMES: [&str; 13] = [
    "upload_data",
    "list_repos",
    "get_repo_details",
    "search_by_name",
    "filter_by_language",
    "sort_by_stars",
    "sort_by_forks",
    "get_repos_with_paper",
    "get_repos_with_citations",
    "get_repos_by_date_range",
    "semantic_search",
    "get_statistics",
    "get_available_languages",
];

/// Advertised tool: name, description and JSON-schema arguments
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    let sort_schema = object_schema(
        json!({
            "direction": { "type": "string", "enum": ["asc", "desc"], "default": "desc" },
            "ascending": { "type": "boolean" },
            "limit": { "type": "integer", "minimum": 0, "default": 10 }
        }),
        &[],
    );

    vec![
        ToolDefinition {
            name: "upload_data",
            description: "Upload a JSON array of repository records. Replaces any previously uploaded data.",
            input_schema: object_schema(json!({ "data": { "type": "array" } }), &["data"]),
        },
        ToolDefinition {
            name: "list_repos",
            description: "List repositories in upload order with pagination.",
            input_schema: object_schema(
                json!({
                    "offset": { "type": "integer", "minimum": 0, "default": 0 },
                    "limit": { "type": "integer", "minimum": 0, "default": 20 }
                }),
                &[],
            ),
        },
        ToolDefinition {
            name: "get_repo_details",
            description: "Full record of one repository by exact name.",
            input_schema: object_schema(json!({ "name": { "type": "string" } }), &["name"]),
        },
        ToolDefinition {
            name: "search_by_name",
            description: "Case-insensitive substring search over repository names.",
            input_schema: object_schema(
                json!({
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 0, "default": 20 }
                }),
                &["query"],
            ),
        },
        ToolDefinition {
            name: "filter_by_language",
            description: "Repositories whose primary language matches (case-insensitive).",
            input_schema: object_schema(json!({ "language": { "type": "string" } }), &["language"]),
        },
        ToolDefinition {
            name: "sort_by_stars",
            description: "Repositories sorted by star count.",
            input_schema: sort_schema.clone(),
        },
        ToolDefinition {
            name: "sort_by_forks",
            description: "Repositories sorted by fork count.",
            input_schema: sort_schema,
        },
        ToolDefinition {
            name: "get_repos_with_paper",
            description: "Repositories with an associated main paper.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "get_repos_with_citations",
            description: "Repositories whose paper has at least min_citations citing DOIs, most cited first.",
            input_schema: object_schema(
                json!({ "min_citations": { "type": "integer", "minimum": 1, "default": 1 } }),
                &[],
            ),
        },
        ToolDefinition {
            name: "get_repos_by_date_range",
            description: "Repositories created or updated within an inclusive date range.",
            input_schema: object_schema(
                json!({
                    "start": { "type": "string", "description": "ISO date or datetime" },
                    "end": { "type": "string", "description": "ISO date or datetime" },
                    "date_field": { "type": "string", "enum": ["createdAt", "updatedAt"], "default": "createdAt" }
                }),
                &[],
            ),
        },
        ToolDefinition {
            name: "semantic_search",
            description: "Natural-language search over names, descriptions, papers and READMEs.",
            input_schema: object_schema(
                json!({
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 0, "default": 10 }
                }),
                &["query"],
            ),
        },
        ToolDefinition {
            name: "get_statistics",
            description: "Aggregate statistics of the uploaded dataset.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "get_available_languages",
            description: "Distinct primary languages in the dataset.",
            input_schema: object_schema(json!({}), &[]),
        },
    ]
}

// ============================================================================
// Tests
// ============================================================================
