//! Feature-hashing embedder.

use async_trait::async_trait;
use tracing::debug;

use rag_core::{Embedder, EmbeddingConfig, RagError, Result};

/// Query prefix for asymmetric retrieval.
const QUERY_PREFIX: &str = "query: ";

/// Passage prefix for asymmetric retrieval.
const PASSAGE_PREFIX: &str = "passage: ";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Embedder that hashes word tokens into a fixed number of buckets.
///
/// Each lowercase alphanumeric token adds ±1 to one bucket chosen by its
/// FNV-1a hash, and the result is L2 normalized. Texts sharing words end up
/// close under cosine similarity. Deterministic across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    query_prefix: String,
    passage_prefix: String,
}

impl HashingEmbedder {
    /// Create an embedder with the default prefixes.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::embedding("dimension must be > 0"));
        }

        Ok(Self {
            dimension,
            query_prefix: QUERY_PREFIX.to_string(),
            passage_prefix: PASSAGE_PREFIX.to_string(),
        })
    }

    /// Create an embedder from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::new(config.dimension)?
            .with_prefixes(&config.query_prefix, &config.passage_prefix))
    }

    /// Override the query and passage prefixes.
    pub fn with_prefixes(mut self, query_prefix: &str, passage_prefix: &str) -> Self {
        self.query_prefix = query_prefix.to_string();
        self.passage_prefix = passage_prefix.to_string();
        self
    }

    fn embed_text(&self, text: &str, prefix: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        let prefixed = format!("{}{}", prefix, text);
        for token in prefixed
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding {} passages", texts.len());
        Ok(texts
            .iter()
            .map(|text| self.embed_text(text, &self.passage_prefix))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text, &self.query_prefix))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_embedder() {
        let embedder = HashingEmbedder::new(256).unwrap();

        assert_eq!(embedder.dimension(), 256);

        let texts = ["Hello world", "Rust is great"];
        let embeddings = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 256);

        // Check L2 normalization
        let norm: f32 = embeddings[1].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = HashingEmbedder::new(128).unwrap();

        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_query("Consistent, input!").await.unwrap();

        // Case and punctuation do not change the tokens
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let embedder = HashingEmbedder::new(1024).unwrap();

        let query = embedder.embed_query("python programming").await.unwrap();
        let docs = embedder
            .embed_documents(&["a guide to python programming", "french cooking recipes"])
            .await
            .unwrap();

        assert!(cosine(&query, &docs[0]) > cosine(&query, &docs[1]));
    }

    #[tokio::test]
    async fn test_prefixes_separate_queries_from_passages() {
        let embedder = HashingEmbedder::new(1024).unwrap();
        let query = embedder.embed_query("rust").await.unwrap();
        let passage = embedder.embed_documents(&["rust"]).await.unwrap();
        assert_ne!(query, passage[0]);

        let plain = HashingEmbedder::new(1024).unwrap().with_prefixes("", "");
        let query = plain.embed_query("rust").await.unwrap();
        let passage = plain.embed_documents(&["rust"]).await.unwrap();
        assert_eq!(query, passage[0]);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap().with_prefixes("", "");

        let embedding = embedder.embed_query("  ").await.unwrap();
        assert!(embedding.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = HashingEmbedder::new(0).unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }

    #[test]
    fn test_from_config() {
        let config = EmbeddingConfig {
            dimension: 64,
            ..Default::default()
        };

        let embedder = HashingEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.dimension(), 64);
    }
}
