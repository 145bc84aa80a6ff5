//! rag-query - Rank fusion and hybrid search
//!
//! This crate merges ranked result lists with Reciprocal Rank Fusion (RRF)
//! and drives hybrid retrieval (keyword + vector) against an injected
//! search backend and embedding model.
//!
//! # Features
//!
//! - Reciprocal Rank Fusion with configurable `k` and per-list window
//! - Weighted RRF for favoring one retrieval strategy
//! - Hybrid search with concurrent keyword and k-NN legs
//! - Language-filtered vector search
//! - Rule-based result pinning
//! - In-memory backend for tests and local experiments
//!
//! # Example
//!
//! ```rust
//! use rag_query::reciprocal_rank_fusion;
//!
//! let keyword = vec!["A", "B", "C"];
//! let vector = vec!["B", "C", "D"];
//! let fused = reciprocal_rank_fusion(&[keyword, vector], 60.0, 1000).unwrap();
//!
//! let order: Vec<_> = fused.iter().map(|(id, _)| *id).collect();
//! assert_eq!(order, vec!["B", "C", "A", "D"]);
//! ```

mod engine;
mod fusion;
mod memory;
mod rules;

pub use engine::{HybridRequest, HybridSearcher};
pub use fusion::{
    ranked_lists_from_json, reciprocal_rank_fusion, RankFusionEngine, DEFAULT_RRF_K,
    DEFAULT_WINDOW_SIZE,
};
pub use memory::{MemoryBackend, StoredDocument};
pub use rules::{
    apply_pins, CriterionKind, MatchCriteria, PinnedEntry, PinnedRule, RuleActions,
    RuleCriterion, RuleType, Ruleset,
};

// Re-export for convenience
pub use rag_core::{SearchHit, SearchResults};
