//! Aggregate statistics, computed once per upload

use std::collections::BTreeMap;

use serde::Serialize;

use super::record::RepositoryRecord;

/// Summary of a numeric field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: f64,
    /// Widened so large counts cannot overflow
    pub total: u128,
}

impl Distribution {
    /// All zeros for an empty input
    pub fn from_values(values: impl IntoIterator<Item = u64>) -> Self {
        let mut values: Vec<u64> = values.into_iter().collect();
        if values.is_empty() {
            return Self::default();
        }
        values.sort_unstable();

        let n = values.len();
        let total: u128 = values.iter().map(|&v| u128::from(v)).sum();
        let median = if n % 2 == 1 {
            values[n / 2] as f64
        } else {
            (values[n / 2 - 1] as f64 + values[n / 2] as f64) / 2.0
        };

        Self {
            min: values[0],
            max: values[n - 1],
            mean: total as f64 / n as f64,
            median,
            total,
        }
    }
}

/// Dataset-wide aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStatistics {
    pub total_count: usize,
    pub by_language: BTreeMap<String, usize>,
    pub star_distribution: Distribution,
    pub fork_distribution: Distribution,
    pub repos_with_paper_count: usize,
    pub repos_with_citations_count: usize,
    pub repos_with_description: usize,
    pub repos_with_readme: usize,
    pub total_stars: u128,
    pub total_forks: u128,
    /// Distinct languages, sorted
    pub languages: Vec<String>,
}

impl DatasetStatistics {
    pub fn compute(records: &[RepositoryRecord]) -> Self {
        let mut by_language = BTreeMap::new();
        for language in records.iter().filter_map(|r| r.language.as_deref()) {
            *by_language.entry(language.to_string()).or_insert(0) += 1;
        }

        let languages: Vec<String> = by_language.keys().cloned().collect();
        let star_distribution = Distribution::from_values(records.iter().map(|r| r.stars));
        let fork_distribution = Distribution::from_values(records.iter().map(|r| r.forks));

        Self {
            total_count: records.len(),
            languages,
            total_stars: star_distribution.total,
            total_forks: fork_distribution.total,
            star_distribution,
            fork_distribution,
            repos_with_paper_count: records.iter().filter(|r| r.has_paper()).count(),
            repos_with_citations_count: records.iter().filter(|r| r.has_citations()).count(),
            repos_with_description: records.iter().filter(|r| r.description.is_some()).count(),
            repos_with_readme: records.iter().filter(|r| r.readme.is_some()).count(),
            by_language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::parse_records;
    use serde_json::json;

    #[test]
    fn test_distribution() {
        let d = Distribution::from_values([5, 1, 3, 11]);
        assert_eq!(d.min, 1);
        assert_eq!(d.max, 11);
        assert_eq!(d.total, 20);
        assert!((d.mean - 5.0).abs() < 1e-9);
        assert!((d.median - 4.0).abs() < 1e-9);

        let odd = Distribution::from_values([7, 2, 9]);
        assert!((odd.median - 7.0).abs() < 1e-9);

        assert_eq!(Distribution::from_values([]), Distribution::default());
    }

    #[test]
    fn test_totals_do_not_overflow() {
        let records = parse_records(&json!([
            { "name": "a", "stars": u64::MAX, "forks": u64::MAX },
            { "name": "b", "stars": 1, "forks": u64::MAX }
        ]))
        .unwrap();

        let stats = DatasetStatistics::compute(&records);
        assert_eq!(stats.total_stars, u128::from(u64::MAX) + 1);
        assert_eq!(stats.total_forks, 2 * u128::from(u64::MAX));
        assert_eq!(stats.star_distribution.max, u64::MAX);
        assert_eq!(stats.star_distribution.min, 1);

        let expected_mean = (u128::from(u64::MAX) + 1) as f64 / 2.0;
        assert!((stats.star_distribution.mean - expected_mean).abs() / expected_mean < 1e-12);
    }

    #[test]
    fn test_compute() {
        let records = parse_records(&json!([
            { "name": "a", "stars": 10, "forks": 1, "language": "Python", "readme": "r" },
            { "name": "b", "stars": 30, "forks": 3, "language": "Python", "description": "d" },
            { "name": "c", "stars": 20, "language": "Fortran",
              "mainPaper": { "doi": "x", "citationsArray": ["y"] } },
            { "name": "d", "mainPaper": { "doi": "z", "citationsArray": [] } }
        ]))
        .unwrap();

        let stats = DatasetStatistics::compute(&records);
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.by_language.get("Python"), Some(&2));
        assert_eq!(stats.by_language.get("Fortran"), Some(&1));
        assert_eq!(stats.languages, vec!["Fortran", "Python"]);
        assert_eq!(stats.total_stars, 60);
        assert_eq!(stats.total_forks, 4);
        assert_eq!(stats.star_distribution.max, 30);
        assert_eq!(stats.repos_with_paper_count, 2);
        assert_eq!(stats.repos_with_citations_count, 1);
        assert_eq!(stats.repos_with_description, 1);
        assert_eq!(stats.repos_with_readme, 1);
    }
}
