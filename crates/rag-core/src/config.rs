//! Configuration types for hybrid retrieval and rank fusion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RagError, Result};
use crate::types::FieldBoost;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Rank fusion configuration.
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Reciprocal Rank Fusion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Smoothing constant k, must be > 0.
    #[serde(default = "default_rrf_k")]
    pub k: f64,

    /// Leading entries of each list that participate in scoring.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            window_size: 1000,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Index searched by default.
    #[serde(default = "default_index")]
    pub index: String,

    /// Vector field used for k-NN search.
    #[serde(default = "default_knn_field")]
    pub knn_field: String,

    /// Number of neighbors requested from k-NN search.
    #[serde(default = "default_knn_k")]
    pub knn_k: usize,

    /// Candidates considered by the backend for k-NN search.
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,

    /// Metadata field holding a document's language.
    #[serde(default = "default_language_field")]
    pub language_field: String,

    /// Fusion weight of the keyword list.
    #[serde(default = "default_weight")]
    pub keyword_weight: f64,

    /// Fusion weight of the vector list.
    #[serde(default = "default_weight")]
    pub vector_weight: f64,

    /// Fields matched by keyword search.
    #[serde(default = "default_keyword_fields")]
    pub keyword_fields: Vec<FieldBoost>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            index: default_index(),
            knn_field: default_knn_field(),
            knn_k: 5,
            num_candidates: 10,
            language_field: default_language_field(),
            keyword_weight: 1.0,
            vector_weight: 1.0,
            keyword_fields: default_keyword_fields(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Output vector dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Prefix prepended to queries.
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    /// Prefix prepended to passages.
    #[serde(default = "default_passage_prefix")]
    pub passage_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 1024,
            query_prefix: default_query_prefix(),
            passage_prefix: default_passage_prefix(),
        }
    }
}

// Default value functions

fn default_rrf_k() -> f64 {
    60.0
}

fn default_window_size() -> usize {
    1000
}

fn default_top_k() -> usize {
    5
}

fn default_index() -> String {
    "book_index".to_string()
}

fn default_keyword_fields() -> Vec<FieldBoost> {
    vec![FieldBoost::new("summary")]
}

fn default_knn_field() -> String {
    "title_vector".to_string()
}

fn default_knn_k() -> usize {
    5
}

fn default_num_candidates() -> usize {
    10
}

fn default_language_field() -> String {
    "language".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_dimension() -> usize {
    1024
}

fn default_query_prefix() -> String {
    "query: ".to_string()
}

fn default_passage_prefix() -> String {
    "passage: ".to_string()
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RagError::config(format!(
            "{} must be a positive number, got {}",
            name, value
        )));
    }
    Ok(())
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rag-fusion").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("rag-fusion.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        require_positive("fusion.k", self.fusion.k)?;
        if self.fusion.window_size == 0 {
            return Err(RagError::config("fusion.window_size must be > 0"));
        }

        let search = &self.search;
        if search.top_k == 0 {
            return Err(RagError::config("search.top_k must be > 0"));
        }
        if search.keyword_fields.is_empty() {
            return Err(RagError::config("search.keyword_fields must not be empty"));
        }
        for field in &search.keyword_fields {
            if field.field.trim().is_empty() {
                return Err(RagError::config("search.keyword_fields entries need a field name"));
            }
            require_positive(
                &format!("search.keyword_fields.{}.boost", field.field),
                field.boost as f64,
            )?;
        }
        if search.knn_k == 0 {
            return Err(RagError::config("search.knn_k must be > 0"));
        }
        if search.knn_k > search.num_candidates {
            return Err(RagError::config(format!(
                "search.knn_k ({}) must not exceed search.num_candidates ({})",
                search.knn_k, search.num_candidates
            )));
        }
        require_positive("search.keyword_weight", search.keyword_weight)?;
        require_positive("search.vector_weight", search.vector_weight)?;

        if self.embedding.dimension == 0 {
            return Err(RagError::config("embedding.dimension must be > 0"));
        }

        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RagError::config(format!("Failed to render config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.fusion.k, 60.0);
        assert_eq!(config.fusion.window_size, 1000);
        assert_eq!(config.search.knn_k, 5);
        assert_eq!(config.embedding.query_prefix, "query: ");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fusion]\nk = 20.0\nwindow_size = 50").unwrap();

        let config = RagConfig::load(file.path()).unwrap();
        assert_eq!(config.fusion.k, 20.0);
        assert_eq!(config.fusion.window_size, 50);
        assert_eq!(config.search, SearchConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fusion]\nk = 0.0").unwrap();

        let err = RagConfig::load(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fusion\nk = ").unwrap();

        assert!(matches!(
            RagConfig::load(file.path()),
            Err(RagError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_knn_bounds() {
        let mut config = RagConfig::default();
        config.search.knn_k = 20;
        config.search.num_candidates = 10;
        assert!(config.validate().is_err());

        config.search.num_candidates = 20;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_weights() {
        let mut config = RagConfig::default();
        config.search.vector_weight = f64::NAN;
        assert!(config.validate().is_err());

        config.search.vector_weight = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_non_positive_boost() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[search.keyword_fields]]\nfield = \"summary\"\nboost = -1.0"
        )
        .unwrap();

        let err = RagConfig::load(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("search.keyword_fields.summary.boost"));
    }

    #[test]
    fn test_validate_keyword_fields() {
        let mut config = RagConfig::default();
        config.search.keyword_fields = vec![FieldBoost::new("title").with_boost(0.0)];
        assert!(config.validate().is_err());

        config.search.keyword_fields = vec![FieldBoost::new("title").with_boost(f32::NAN)];
        assert!(config.validate().is_err());

        config.search.keyword_fields = vec![FieldBoost::new(" ")];
        assert!(config.validate().is_err());

        config.search.keyword_fields = vec![FieldBoost::new("title").with_boost(3.0)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = RagConfig::default();
        config.search.keyword_fields = vec![FieldBoost::new("title").with_boost(3.0)];

        let rendered = config.to_toml().unwrap();
        let parsed: RagConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
