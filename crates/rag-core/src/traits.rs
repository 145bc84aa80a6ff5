//! Core traits defining the collaborators of the retrieval pipeline.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Hit, KeywordQuery, KnnQuery};

/// Search backend client.
///
/// Clients are constructed by the caller and passed explicitly; the caller
/// owns the lifecycle (`ping` after construction, `close` when done).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Lexical search. Hits are ordered best-first.
    async fn keyword_search(&self, query: &KeywordQuery) -> Result<Vec<Hit>>;

    /// Vector similarity search. Hits are ordered best-first.
    async fn knn_search(&self, query: &KnnQuery) -> Result<Vec<Hit>>;

    /// Release any resources held by the client.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of passage texts.
    ///
    /// Implementations apply their passage prefix for asymmetric retrieval.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    ///
    /// Implementations apply their query prefix for asymmetric retrieval.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}
