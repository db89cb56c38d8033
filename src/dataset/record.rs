//! Record Model - validated repository entries
//!
//! Uploaded JSON is walked once here and turned into `RepositoryRecord`s.
//! Nothing downstream ever sees an untyped `serde_json::Value`.
//!
//! Validation is fail-fast: the first bad element aborts the whole upload with
//! a `ValidationError` naming its index. The one tolerated defect is
//! `mainPaper.citationsArray`, where non-string entries are dropped silently.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::embedding::normalize_text;
use crate::error::{QueryError, QueryResult};

/// README prefix used for the semantic text (characters)
pub const README_EXCERPT_CHARS: usize = 4000;

// ============================================================================
// Types
// ============================================================================

/// One repository entry, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub readme: Option<String>,
    pub homepage: Option<String>,
    pub readme_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub main_paper: Option<MainPaper>,
}

/// Publication associated with a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPaper {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub date_released: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Citing DOIs, upload order. Frequently empty upstream.
    pub citations_array: Vec<String>,
}

/// Which timestamp a date-range query looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DateField {
    #[default]
    #[serde(rename = "createdAt", alias = "created_at")]
    CreatedAt,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    UpdatedAt,
}

impl RepositoryRecord {
    /// `mainPaper` present
    pub fn has_paper(&self) -> bool {
        self.main_paper.is_some()
    }

    pub fn citation_count(&self) -> usize {
        self.main_paper
            .as_ref()
            .map(|p| p.citations_array.len())
            .unwrap_or(0)
    }

    pub fn has_citations(&self) -> bool {
        self.citation_count() > 0
    }

    pub fn date(&self, field: DateField) -> Option<DateTime<Utc>> {
        match field {
            DateField::CreatedAt => self.created_at,
            DateField::UpdatedAt => self.updated_at,
        }
    }

    /// Text fed to the embedding model.
    ///
    /// Always contains the name, so a record without description or README
    /// still gets a meaningful vector.
    pub fn semantic_text(&self) -> String {
        let mut parts = vec![format!("Repository: {}", self.name)];

        if let Some(ref description) = self.description {
            parts.push(format!("Description: {}", description));
        }

        if let Some(ref paper) = self.main_paper {
            if let Some(ref title) = paper.title {
                parts.push(format!("Paper Title: {}", title));
            }
            if let Some(ref abstract_text) = paper.abstract_text {
                parts.push(format!("Abstract: {}", abstract_text));
            }
        }

        if let Some(ref readme) = self.readme {
            let excerpt: String = readme.chars().take(README_EXCERPT_CHARS).collect();
            parts.push(format!("README: {}", excerpt));
        }

        normalize_text(&parts.join("\n\n"))
    }
}

/// Compact view used by list-style responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositorySummary {
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub has_paper: bool,
    pub citation_count: usize,
}

impl From<&RepositoryRecord> for RepositorySummary {
    fn from(record: &RepositoryRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            description: record.description.clone(),
            stars: record.stars,
            forks: record.forks,
            language: record.language.clone(),
            has_paper: record.has_paper(),
            citation_count: record.citation_count(),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Validate an uploaded JSON array into records, preserving upload order.
pub fn parse_records(raw: &Value) -> QueryResult<Vec<RepositoryRecord>> {
    let items = raw.as_array().ok_or_else(|| {
        QueryError::validation(format!(
            "Upload data must be a JSON array of repository objects, got {}",
            json_type(raw)
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_record(index, item))
        .collect()
}

fn parse_record(index: usize, item: &Value) -> QueryResult<RepositoryRecord> {
    let obj = item.as_object().ok_or_else(|| {
        QueryError::validation(format!(
            "Record {}: expected an object, got {}",
            index,
            json_type(item)
        ))
    })?;

    let name = optional_string(obj, "name", index)?
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            QueryError::validation(format!("Record {}: missing or empty 'name'", index))
        })?;

    Ok(RepositoryRecord {
        url: optional_string(obj, "url", index)?,
        description: optional_string(obj, "description", index)?,
        language: optional_string(obj, "language", index)?.map(|l| l.trim().to_string()),
        stars: count_field(obj, "stars", index)?,
        forks: count_field(obj, "forks", index)?,
        readme: optional_string(obj, "readme", index)?,
        homepage: optional_string(obj, "homepage", index)?,
        readme_url: optional_string(obj, "readmeUrl", index)?,
        created_at: timestamp_field(obj, "createdAt", index)?,
        updated_at: timestamp_field(obj, "updatedAt", index)?,
        main_paper: main_paper_field(obj, index)?,
        name,
    })
}

fn main_paper_field(obj: &Map<String, Value>, index: usize) -> QueryResult<Option<MainPaper>> {
    let paper = match obj.get("mainPaper") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(paper)) => paper,
        Some(other) => {
            return Err(QueryError::validation(format!(
                "Record {}: 'mainPaper' must be an object, got {}",
                index,
                json_type(other)
            )))
        }
    };

    let citations_array = match paper.get("citationsArray") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            tracing::debug!(
                "Record {}: ignoring malformed citationsArray ({})",
                index,
                json_type(other)
            );
            Vec::new()
        }
    };

    Ok(Some(MainPaper {
        doi: optional_string(paper, "doi", index)?,
        title: optional_string(paper, "title", index)?,
        journal: optional_string(paper, "journal", index)?,
        date_released: optional_string(paper, "dateReleased", index)?,
        abstract_text: optional_string(paper, "abstract", index)?,
        citations_array,
    }))
}

/// Absent, null and blank strings all map to `None`.
fn optional_string(obj: &Map<String, Value>, key: &str, index: usize) -> QueryResult<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(QueryError::validation(format!(
            "Record {}: '{}' must be a string, got {}",
            index,
            key,
            json_type(other)
        ))),
    }
}

/// Non-negative integer; accepts integral floats and numeric strings.
fn count_field(obj: &Map<String, Value>, key: &str, index: usize) -> QueryResult<u64> {
    let invalid = |shown: String| {
        QueryError::validation(format!(
            "Record {}: '{}' must be a non-negative integer, got {}",
            index, key, shown
        ))
    };

    match obj.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
                _ => Err(invalid(n.to_string())),
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(format!("\"{}\"", s))),
        Some(other) => Err(invalid(json_type(other).to_string())),
    }
}

/// Optional timestamp. An unparsable value is kept out of date queries but
/// does not reject the record.
fn timestamp_field(obj: &Map<String, Value>, key: &str, index: usize) -> QueryResult<Option<DateTime<Utc>>> {
    Ok(optional_string(obj, key, index)?.and_then(|s| {
        let parsed = parse_timestamp(&s);
        if parsed.is_none() {
            tracing::debug!("Record {}: ignoring unparsable '{}' value \"{}\"", index, key, s);
        }
        parsed
    }))
}

// ============================================================================
// Date Helpers
// ============================================================================

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 timestamp: `T` or space separator, optional seconds and
/// fraction, optional `Z`/`+HH:MM`/`+HHMM` offset (UTC when absent), or a plain
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let zulu = s.strip_suffix('Z').or_else(|| s.strip_suffix('z'));

    if zulu.is_none() {
        if let Some(dt) = OFFSET_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(s, format).ok())
        {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let local = zulu.unwrap_or(s);
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(local, format).ok())
    {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a query bound. A plain date used as an upper bound covers the whole day.
pub fn parse_bound(s: &str, upper: bool) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if upper {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return d
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .map(|naive| naive.and_utc());
        }
    }
    parse_timestamp(trimmed)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Tests
// ============================================================================
