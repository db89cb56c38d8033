//! Query Engine - read-only capabilities over a `Dataset`
//!
//! Every method borrows the dataset immutably. Result order is always
//! deterministic: when a ranking key ties, upload order decides.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::dataset::{parse_bound, Dataset, DateField, RepositoryRecord};
use crate::error::{QueryError, QueryResult};

// ============================================================================
// Types
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ascending")]
    Asc,
    #[default]
    #[serde(alias = "descending")]
    Desc,
}

/// Numeric field used by sort queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Stars,
    Forks,
}

impl SortField {
    fn value(self, record: &RepositoryRecord) -> u64 {
        match self {
            Self::Stars => record.stars,
            Self::Forks => record.forks,
        }
    }
}

/// One semantic search hit
#[derive(Debug, Clone)]
pub struct SemanticHit<'a> {
    pub record: &'a RepositoryRecord,
    /// Cosine similarity (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// QueryEngine
// ============================================================================

/// Query capabilities bound to one dataset
pub struct QueryEngine<'a> {
    dataset: &'a Dataset,
}

impl<'a> QueryEngine<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    /// Page through records in upload order
    pub fn list_repos(&self, offset: usize, limit: usize) -> &'a [RepositoryRecord] {
        self.dataset.list(offset, limit)
    }

    /// Exact name lookup
    pub fn get_repo_details(&self, name: &str) -> QueryResult<&'a RepositoryRecord> {
        self.dataset.get(name)
    }

    /// Case-insensitive substring match on the name, ranked by match position,
    /// then upload order.
    pub fn search_by_name(&self, query: &str, limit: usize) -> Vec<&'a RepositoryRecord> {
        let needle = query.trim().to_lowercase();

        let mut matches: Vec<(usize, &'a RepositoryRecord)> = self
            .dataset
            .all()
            .iter()
            .filter_map(|r| r.name.to_lowercase().find(&needle).map(|pos| (pos, r)))
            .collect();

        matches.sort_by_key(|(pos, _)| *pos);
        matches.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    /// Exact case-insensitive language match; records without a language never match.
    pub fn filter_by_language(&self, language: &str) -> Vec<&'a RepositoryRecord> {
        let wanted = language.trim().to_lowercase();

        self.dataset
            .all()
            .iter()
            .filter(|r| {
                r.language
                    .as_deref()
                    .map(|l| l.to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Stable sort on a numeric field
    pub fn sort_by(
        &self,
        field: SortField,
        direction: SortDirection,
        limit: usize,
    ) -> Vec<&'a RepositoryRecord> {
        let mut records: Vec<&'a RepositoryRecord> = self.dataset.all().iter().collect();

        match direction {
            SortDirection::Asc => records.sort_by_key(|r| field.value(r)),
            SortDirection::Desc => records.sort_by_key(|r| Reverse(field.value(r))),
        }

        records.truncate(limit);
        records
    }

    pub fn sort_by_stars(&self, direction: SortDirection, limit: usize) -> Vec<&'a RepositoryRecord> {
        self.sort_by(SortField::Stars, direction, limit)
    }

    pub fn sort_by_forks(&self, direction: SortDirection, limit: usize) -> Vec<&'a RepositoryRecord> {
        self.sort_by(SortField::Forks, direction, limit)
    }

    /// Records with a `mainPaper`
    pub fn get_repos_with_paper(&self) -> Vec<&'a RepositoryRecord> {
        self.dataset.all().iter().filter(|r| r.has_paper()).collect()
    }

    /// Records with at least `min_citations` citing DOIs (never fewer than
    /// one), most cited first.
    ///
    /// Upstream citation data is often empty; an empty result is normal.
    pub fn get_repos_with_citations(&self, min_citations: usize) -> Vec<&'a RepositoryRecord> {
        let threshold = min_citations.max(1);

        let mut records: Vec<&'a RepositoryRecord> = self
            .dataset
            .all()
            .iter()
            .filter(|r| r.citation_count() >= threshold)
            .collect();

        records.sort_by_key(|r| Reverse(r.citation_count()));
        records
    }

    /// Records whose `field` timestamp lies within the inclusive bounds.
    ///
    /// A missing bound is open. A date-only `end` covers that whole day.
    /// Records without the timestamp are excluded.
    pub fn get_repos_by_date_range(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        field: DateField,
    ) -> QueryResult<Vec<&'a RepositoryRecord>> {
        let start = start.map(|s| parse_query_bound(s, false)).transpose()?;
        let end = end.map(|s| parse_query_bound(s, true)).transpose()?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(QueryError::validation(format!(
                    "start date {} is after end date {}",
                    s.to_rfc3339(),
                    e.to_rfc3339()
                )));
            }
        }

        Ok(self
            .dataset
            .all()
            .iter()
            .filter(|r| match r.date(field) {
                None => false,
                Some(date) => start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e),
            })
            .collect())
    }

    /// Embedding similarity search, best match first
    pub async fn semantic_search(&self, query: &str, limit: usize) -> QueryResult<Vec<SemanticHit<'a>>> {
        if query.trim().is_empty() {
            return Err(QueryError::validation("semantic_search query must not be empty"));
        }

        let index = self.dataset.index().ready()?;
        let hits = index.query(query, limit).await?;

        tracing::debug!("Semantic search '{}' -> {} hits", query, hits.len());

        let all = self.dataset.all();
        Ok(hits
            .into_iter()
            .map(|hit| SemanticHit {
                record: &all[hit.position],
                score: hit.similarity,
            })
            .collect())
    }

    /// Distinct non-empty languages, sorted
    pub fn get_available_languages(&self) -> &'a [String] {
        &self.dataset.statistics().languages
    }
}

fn parse_query_bound(raw: &str, upper: bool) -> QueryResult<chrono::DateTime<chrono::Utc>> {
    parse_bound(raw, upper).ok_or_else(|| {
        QueryError::validation(format!(
            "Invalid date '{}': use ISO format, e.g. 2020-01-01 or 2020-01-01T00:00:00Z",
            raw
        ))
    })
}

// ============================================================================
// Tests
// ============================================================================
