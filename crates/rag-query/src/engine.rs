//! Hybrid search engine.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use rag_core::{
    Embedder, Hit, KeywordQuery, KnnQuery, RagConfig, RagError, Result, SearchBackend,
    SearchConfig, SearchHit, SearchResults, TermFilter,
};

use crate::fusion::RankFusionEngine;
use crate::rules::{apply_pins, MatchCriteria, Ruleset};

/// A hybrid search request.
#[derive(Debug, Clone, Default)]
pub struct HybridRequest {
    /// Free-text query.
    pub query: String,

    /// Maximum number of results (configured default when None).
    pub top_k: Option<usize>,

    /// Restrict the vector leg to documents in this language.
    pub language: Option<String>,

    /// Request metadata for pinning rules.
    pub match_criteria: MatchCriteria,
}

impl HybridRequest {
    /// Create a request for a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Restrict the vector leg to a language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Add request metadata for pinning rules.
    pub fn with_criterion(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_criteria.insert(key.into(), value.into());
        self
    }
}

/// Hybrid search engine.
///
/// Runs keyword search and vector similarity search concurrently, then fuses
/// the two rankings with Reciprocal Rank Fusion. Optional pinning rules put
/// promoted documents ahead of the fused ranking.
pub struct HybridSearcher<B, E> {
    /// Search backend.
    backend: Arc<B>,

    /// Embedding model.
    embedder: Arc<E>,

    /// Search parameters.
    config: SearchConfig,

    /// Rank fusion engine.
    fusion: RankFusionEngine,

    /// Pinning rules.
    ruleset: Option<Ruleset>,
}

impl<B, E> HybridSearcher<B, E>
where
    B: SearchBackend,
    E: Embedder,
{
    /// Create a new hybrid searcher.
    pub fn new(
        backend: Arc<B>,
        embedder: Arc<E>,
        config: SearchConfig,
        fusion: RankFusionEngine,
    ) -> Self {
        Self {
            backend,
            embedder,
            config,
            fusion,
            ruleset: None,
        }
    }

    /// Create a hybrid searcher from validated configuration.
    pub fn from_config(backend: Arc<B>, embedder: Arc<E>, config: &RagConfig) -> Result<Self> {
        config.validate()?;
        let fusion = RankFusionEngine::from_config(&config.fusion)?;
        Ok(Self::new(backend, embedder, config.search.clone(), fusion))
    }

    /// Attach pinning rules.
    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Result<Self> {
        ruleset.validate()?;
        self.ruleset = Some(ruleset);
        Ok(self)
    }

    /// Search parameters in use.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Perform a hybrid search.
    pub async fn search(&self, request: &HybridRequest) -> Result<SearchResults> {
        let start = Instant::now();
        let top_k = self.resolve_top_k(request.top_k)?;
        validate_query(&request.query)?;

        info!("Hybrid search for: {:?}", request.query);

        let query_embedding = self.embedder.embed_query(&request.query).await?;

        let keyword_query = self.keyword_query(&request.query, top_k.max(self.config.knn_k));
        let knn_query = self.knn_query(query_embedding, request.language.as_deref());

        // Both legs must finish before fusion starts
        let (keyword_hits, vector_hits) = tokio::join!(
            self.backend.keyword_search(&keyword_query),
            self.backend.knn_search(&knn_query)
        );
        let keyword_ids = Hit::ids(&keyword_hits?);
        let vector_ids = Hit::ids(&vector_hits?);

        debug!(
            "Keyword search returned {} ids, vector search returned {} ids",
            keyword_ids.len(),
            vector_ids.len()
        );

        let fused = self.fusion.fuse_weighted(&[
            (keyword_ids, self.config.keyword_weight),
            (vector_ids, self.config.vector_weight),
        ])?;

        debug!("Fused to {} ids", fused.len());

        let pinned = match &self.ruleset {
            Some(ruleset) if !request.match_criteria.is_empty() => {
                ruleset.pinned_ids(&request.match_criteria)
            }
            _ => Vec::new(),
        };
        if !pinned.is_empty() {
            debug!("Pinning {} ids", pinned.len());
        }

        let results: Vec<SearchHit> = apply_pins(fused, &pinned)
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank, entry)| SearchHit {
                rank: rank as u32 + 1,
                id: entry.id,
                score: entry.score,
                pinned: entry.pinned,
            })
            .collect();

        if pinned.len() > top_k {
            warn!(
                "{} pinned ids exceed top_k={}, organic results were crowded out",
                pinned.len(),
                top_k
            );
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            latency_ms,
            results.len()
        );

        Ok(SearchResults {
            query: request.query.clone(),
            total_results: results.len(),
            latency_ms,
            results,
        })
    }

    /// Keyword-only search, ranked by backend score.
    pub async fn keyword_search(&self, query: &str, top_k: Option<usize>) -> Result<SearchResults> {
        let start = Instant::now();
        let top_k = self.resolve_top_k(top_k)?;
        validate_query(query)?;

        let hits = self
            .backend
            .keyword_search(&self.keyword_query(query, top_k))
            .await?;

        Ok(ranked_results(query, hits, start))
    }

    /// Vector-only search, optionally restricted to a language.
    pub async fn vector_search(&self, query: &str, language: Option<&str>) -> Result<SearchResults> {
        let start = Instant::now();
        validate_query(query)?;

        let embedding = self.embedder.embed_query(query).await?;
        let hits = self
            .backend
            .knn_search(&self.knn_query(embedding, language))
            .await?;

        Ok(ranked_results(query, hits, start))
    }

    fn resolve_top_k(&self, top_k: Option<usize>) -> Result<usize> {
        match top_k {
            Some(0) => Err(RagError::invalid_argument("top_k must be > 0")),
            Some(k) => Ok(k),
            None => Ok(self.config.top_k),
        }
    }

    fn keyword_query(&self, query: &str, size: usize) -> KeywordQuery {
        KeywordQuery {
            index: self.config.index.clone(),
            query: query.to_string(),
            fields: self.config.keyword_fields.clone(),
            size,
        }
    }

    fn knn_query(&self, vector: Vec<f32>, language: Option<&str>) -> KnnQuery {
        KnnQuery {
            index: self.config.index.clone(),
            field: self.config.knn_field.clone(),
            vector,
            k: self.config.knn_k,
            num_candidates: self.config.num_candidates,
            filter: language.map(|lang| TermFilter::new(&self.config.language_field, lang)),
        }
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::invalid_argument("query must not be empty"));
    }
    Ok(())
}

fn ranked_results(query: &str, hits: Vec<Hit>, start: Instant) -> SearchResults {
    let results: Vec<SearchHit> = hits
        .into_iter()
        .enumerate()
        .map(|(rank, hit)| SearchHit {
            rank: rank as u32 + 1,
            id: hit.id,
            score: hit.score as f64,
            pinned: false,
        })
        .collect();

    SearchResults {
        query: query.to_string(),
        total_results: results.len(),
        latency_ms: start.elapsed().as_millis() as u64,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::memory::{MemoryBackend, StoredDocument};
    use crate::rules::{CriterionKind, PinnedRule, RuleCriterion};

    /// Maps known words onto fixed axes so expected rankings are exact.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| axis_vector(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(axis_vector(text))
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    fn axis_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 4];
        for word in text.to_lowercase().split_whitespace() {
            match word {
                "python" => v[0] += 1.0,
                "javascript" => v[1] += 1.0,
                "cooking" => v[2] += 1.0,
                _ => {}
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[3] = 1.0;
        }
        v
    }

    fn corpus() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new();
        let books = [
            ("b1", "A guide to python programming", "en", [1.0, 0.0, 0.0, 0.0]),
            ("b2", "Learn javascript programming", "en", [0.0, 1.0, 0.0, 0.0]),
            ("b3", "Recipes for python developers", "en", [0.8, 0.0, 0.6, 0.0]),
            ("b4", "French cooking guide", "fr", [0.0, 0.0, 1.0, 0.0]),
            ("b5", "Python lernen", "de", [0.9, 0.0, 0.0, 0.1]),
        ];
        for (id, summary, language, vector) in books {
            backend
                .insert(
                    "book_index",
                    StoredDocument::new(id)
                        .with_field("summary", summary)
                        .with_field("language", language)
                        .with_vector("title_vector", vector.to_vec()),
                )
                .unwrap();
        }
        Arc::new(backend)
    }

    fn searcher(backend: Arc<MemoryBackend>) -> HybridSearcher<MemoryBackend, AxisEmbedder> {
        HybridSearcher::from_config(backend, Arc::new(AxisEmbedder), &RagConfig::default())
            .unwrap()
    }

    fn promotion() -> Ruleset {
        Ruleset::new(
            "promotion-rules",
            vec![PinnedRule::new(
                "us-cooking",
                vec![
                    RuleCriterion::new(CriterionKind::Contains, "my_query", &["python"]),
                    RuleCriterion::new(CriterionKind::Exact, "country", &["us"]),
                ],
                &["b4"],
            )],
        )
    }

    #[tokio::test]
    async fn test_hybrid_search_fuses_both_legs() {
        let searcher = searcher(corpus());

        let results = searcher
            .search(&HybridRequest::new("python programming"))
            .await
            .unwrap();

        // b2 and b5 tie on 1/62 + 1/64 and resolve by id.
        assert_eq!(results.ids(), vec!["b1", "b2", "b5", "b3", "b4"]);
        assert_eq!(results.total_results, 5);
        assert!((results.results[0].score - 2.0 / 61.0).abs() < 1e-12);
        assert_eq!(results.results[1].score, results.results[2].score);
        assert_eq!(results.results[4].rank, 5);
    }

    #[tokio::test]
    async fn test_hybrid_search_top_k() {
        let searcher = searcher(corpus());

        let results = searcher
            .search(&HybridRequest::new("python programming").with_top_k(2))
            .await
            .unwrap();

        assert_eq!(results.ids(), vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_hybrid_search_language_filter() {
        let searcher = searcher(corpus());

        let results = searcher
            .search(&HybridRequest::new("python programming").with_language("en"))
            .await
            .unwrap();

        // The filter only narrows the vector leg; b5 stays via keywords.
        assert_eq!(results.ids(), vec!["b1", "b2", "b3", "b5"]);
    }

    #[tokio::test]
    async fn test_hybrid_search_pins_rule_ids() {
        let searcher = searcher(corpus()).with_ruleset(promotion()).unwrap();

        let request = HybridRequest::new("python programming")
            .with_criterion("my_query", "python programming")
            .with_criterion("country", "us");
        let results = searcher.search(&request).await.unwrap();

        assert_eq!(results.ids(), vec!["b4", "b1", "b2", "b5", "b3"]);
        assert!(results.results[0].pinned);
        assert!((results.results[0].score - 1.0 / 65.0).abs() < 1e-12);
        assert!(results.results[1..].iter().all(|r| !r.pinned));
    }

    #[tokio::test]
    async fn test_hybrid_search_rules_not_matching() {
        let searcher = searcher(corpus()).with_ruleset(promotion()).unwrap();

        let request = HybridRequest::new("python programming")
            .with_criterion("my_query", "python programming")
            .with_criterion("country", "uk");
        let results = searcher.search(&request).await.unwrap();

        assert_eq!(results.ids(), vec!["b1", "b2", "b5", "b3", "b4"]);
    }

    #[tokio::test]
    async fn test_hybrid_search_rejects_bad_requests() {
        let searcher = searcher(corpus());

        let err = searcher.search(&HybridRequest::new("  ")).await.unwrap_err();
        assert!(err.is_invalid_argument());

        let err = searcher
            .search(&HybridRequest::new("python").with_top_k(0))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_hybrid_search_propagates_backend_errors() {
        let backend = corpus();
        let searcher = searcher(backend.clone());

        backend.close().await.unwrap();

        let err = searcher
            .search(&HybridRequest::new("python"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_ERROR");
    }

    /// Serves keyword hits from an inner backend but fails every k-NN call.
    struct BrokenKnnBackend {
        inner: Arc<MemoryBackend>,
    }

    #[async_trait]
    impl SearchBackend for BrokenKnnBackend {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn keyword_search(&self, query: &KeywordQuery) -> Result<Vec<Hit>> {
            self.inner.keyword_search(query).await
        }

        async fn knn_search(&self, _query: &KnnQuery) -> Result<Vec<Hit>> {
            Err(RagError::backend("knn shard unavailable"))
        }
    }

    #[tokio::test]
    async fn test_hybrid_search_fails_when_one_leg_fails() {
        let backend = Arc::new(BrokenKnnBackend { inner: corpus() });
        let searcher =
            HybridSearcher::from_config(backend, Arc::new(AxisEmbedder), &RagConfig::default())
                .unwrap();

        // The keyword leg alone still answers.
        let keyword = searcher.keyword_search("python", None).await.unwrap();
        assert_eq!(keyword.ids(), vec!["b1", "b3", "b5"]);

        let err = searcher
            .search(&HybridRequest::new("python programming"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_ERROR");
        assert!(err.to_string().contains("knn shard unavailable"));
    }

    #[tokio::test]
    async fn test_keyword_only_search() {
        let searcher = searcher(corpus());

        let results = searcher.keyword_search("python", Some(10)).await.unwrap();

        assert_eq!(results.ids(), vec!["b1", "b3", "b5"]);
        assert_eq!(results.results[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_vector_only_search_with_language() {
        let searcher = searcher(corpus());

        let results = searcher.vector_search("python", Some("de")).await.unwrap();
        assert_eq!(results.ids(), vec!["b5"]);

        let results = searcher.vector_search("python", None).await.unwrap();
        assert_eq!(results.ids()[..3], ["b1", "b5", "b3"]);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = RagConfig::default();
        config.fusion.window_size = 0;

        let result = HybridSearcher::from_config(corpus(), Arc::new(AxisEmbedder), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_ruleset_validates() {
        let mut rules = promotion();
        rules.rules[0].actions.ids.clear();

        assert!(searcher(corpus()).with_ruleset(rules).is_err());
    }
}
