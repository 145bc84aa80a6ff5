//! Core domain types shared by retrieval collaborators and the fusion engine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RagError;

/// Opaque document identifier as returned by a search backend.
pub type DocId = String;

/// A field to match against, with a score multiplier.
///
/// Parses from the `field^boost` shorthand, e.g. `title^3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBoost {
    /// Field name.
    pub field: String,

    /// Score multiplier for matches in this field.
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl FieldBoost {
    /// Create a field with boost 1.0.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            boost: 1.0,
        }
    }

    /// Set the boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

impl FromStr for FieldBoost {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, boost) = match s.split_once('^') {
            Some((field, boost)) => {
                let boost: f32 = boost.trim().parse().map_err(|_| {
                    RagError::invalid_argument(format!("invalid boost in {:?}", s))
                })?;
                (field.trim(), boost)
            }
            None => (s.trim(), 1.0),
        };

        if field.is_empty() {
            return Err(RagError::invalid_argument(format!(
                "empty field name in {:?}",
                s
            )));
        }
        if !boost.is_finite() || boost <= 0.0 {
            return Err(RagError::invalid_argument(format!(
                "boost must be positive in {:?}",
                s
            )));
        }

        Ok(Self {
            field: field.to_string(),
            boost,
        })
    }
}

impl std::fmt::Display for FieldBoost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if (self.boost - 1.0).abs() < f32::EPSILON {
            write!(f, "{}", self.field)
        } else {
            write!(f, "{}^{}", self.field, self.boost)
        }
    }
}

/// Exact-term filter applied before vector scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    /// Field to compare.
    pub field: String,

    /// Required value.
    pub value: String,
}

impl TermFilter {
    /// Create a term filter.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Lexical (keyword) search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordQuery {
    /// Index to search.
    pub index: String,

    /// Free-text query.
    pub query: String,

    /// Fields to match, with boosts.
    pub fields: Vec<FieldBoost>,

    /// Maximum number of hits.
    pub size: usize,
}

/// Vector (k-nearest-neighbor) search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnQuery {
    /// Index to search.
    pub index: String,

    /// Vector field to compare against.
    pub field: String,

    /// Query embedding.
    pub vector: Vec<f32>,

    /// Number of neighbors to return.
    pub k: usize,

    /// Candidates considered per shard by the backend.
    pub num_candidates: usize,

    /// Optional exact-term pre-filter.
    pub filter: Option<TermFilter>,
}

/// A single backend hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Document identifier.
    pub id: DocId,

    /// Backend relevance score (scale is backend-specific).
    pub score: f32,
}

impl Hit {
    /// Create a hit.
    pub fn new(id: impl Into<DocId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }

    /// Extract the ranked id sequence from best-first hits.
    pub fn ids(hits: &[Hit]) -> Vec<DocId> {
        hits.iter().map(|h| h.id.clone()).collect()
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result rank (1-indexed).
    pub rank: u32,

    /// Document identifier.
    pub id: DocId,

    /// Relevance score (higher is better).
    pub score: f64,

    /// Whether the hit was pinned by a rule rather than ranked organically.
    #[serde(default)]
    pub pinned: bool,
}

/// Search results container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// The query as submitted.
    pub query: String,

    /// Total results returned.
    pub total_results: usize,

    /// Search latency in milliseconds.
    pub latency_ms: u64,

    /// Individual results.
    pub results: Vec<SearchHit>,
}

impl SearchResults {
    /// Identifiers in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_boost_parse() {
        let f: FieldBoost = "title^3".parse().unwrap();
        assert_eq!(f.field, "title");
        assert_eq!(f.boost, 3.0);

        let f: FieldBoost = "summary".parse().unwrap();
        assert_eq!(f, FieldBoost::new("summary"));
    }

    #[test]
    fn test_field_boost_parse_invalid() {
        assert!("^2".parse::<FieldBoost>().is_err());
        assert!("title^abc".parse::<FieldBoost>().is_err());
        assert!("title^0".parse::<FieldBoost>().is_err());
        assert!("title^-1".parse::<FieldBoost>().is_err());
    }

    #[test]
    fn test_field_boost_display() {
        assert_eq!(FieldBoost::new("name").with_boost(5.0).to_string(), "name^5");
        assert_eq!(FieldBoost::new("description").to_string(), "description");
    }

    #[test]
    fn test_hit_ids() {
        let hits = vec![Hit::new("b", 2.0), Hit::new("a", 1.0)];
        assert_eq!(Hit::ids(&hits), vec!["b".to_string(), "a".to_string()]);
    }
}
