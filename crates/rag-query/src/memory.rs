//! In-memory search backend.
//!
//! Scores exhaustively: keyword hits count matched query terms per field and
//! k-NN hits use exact cosine similarity. Meant for tests and small local
//! corpora, not as a replacement for a real search service.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use rag_core::{DocId, Hit, KeywordQuery, KnnQuery, RagError, Result, SearchBackend};

/// A document held by [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDocument {
    /// Document identifier.
    pub id: DocId,

    /// Text and keyword fields.
    pub fields: BTreeMap<String, String>,

    /// Dense vector fields.
    pub vectors: BTreeMap<String, Vec<f32>>,
}

impl StoredDocument {
    /// Create an empty document.
    pub fn new(id: impl Into<DocId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add a text field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add a vector field.
    pub fn with_vector(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(name.into(), vector);
        self
    }
}

/// Search backend over documents kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Documents per index.
    indices: RwLock<HashMap<String, Vec<StoredDocument>>>,

    /// Set once the client is closed.
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index if it does not exist.
    pub fn create_index(&self, name: &str) -> Result<()> {
        let mut indices = self.write()?;
        indices.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Insert or replace a document, creating the index when needed.
    pub fn insert(&self, index: &str, doc: StoredDocument) -> Result<()> {
        if doc.id.is_empty() {
            return Err(RagError::invalid_argument("document id must not be empty"));
        }

        let mut indices = self.write()?;
        let docs = indices.entry(index.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
        Ok(())
    }

    /// Number of documents in an index.
    pub fn doc_count(&self, index: &str) -> Result<usize> {
        let indices = self.read()?;
        indices
            .get(index)
            .map(Vec::len)
            .ok_or_else(|| RagError::IndexNotFound {
                name: index.to_string(),
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(RagError::backend("client is closed"));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<StoredDocument>>>> {
        self.indices
            .read()
            .map_err(|_| RagError::internal("index lock poisoned"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<StoredDocument>>>> {
        self.indices
            .write()
            .map_err(|_| RagError::internal("index lock poisoned"))
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn rank_hits(hits: &mut Vec<Hit>, limit: usize) {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
    hits.truncate(limit);
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn keyword_search(&self, query: &KeywordQuery) -> Result<Vec<Hit>> {
        self.ensure_open()?;

        if query.fields.is_empty() {
            return Err(RagError::invalid_argument(
                "keyword search needs at least one field",
            ));
        }

        let query_terms = terms(&query.query);
        let indices = self.read()?;
        let docs = indices
            .get(&query.index)
            .ok_or_else(|| RagError::IndexNotFound {
                name: query.index.clone(),
            })?;

        let mut hits = Vec::new();
        for doc in docs {
            let mut score = 0.0f32;
            for field in &query.fields {
                if let Some(text) = doc.fields.get(&field.field) {
                    let field_terms = terms(text);
                    let matched = query_terms.intersection(&field_terms).count();
                    score += field.boost * matched as f32;
                }
            }
            if score > 0.0 {
                hits.push(Hit::new(doc.id.clone(), score));
            }
        }

        rank_hits(&mut hits, query.size);

        debug!(
            "Keyword search on '{}' for {:?} returned {} hits",
            query.index,
            query.query,
            hits.len()
        );

        Ok(hits)
    }

    async fn knn_search(&self, query: &KnnQuery) -> Result<Vec<Hit>> {
        self.ensure_open()?;

        if query.k == 0 {
            return Err(RagError::invalid_argument("knn k must be > 0"));
        }
        if query.k > query.num_candidates {
            return Err(RagError::invalid_argument(format!(
                "knn k ({}) must not exceed num_candidates ({})",
                query.k, query.num_candidates
            )));
        }
        if query.vector.is_empty() {
            return Err(RagError::invalid_argument("query vector must not be empty"));
        }

        let indices = self.read()?;
        let docs = indices
            .get(&query.index)
            .ok_or_else(|| RagError::IndexNotFound {
                name: query.index.clone(),
            })?;

        let mut hits = Vec::new();
        for doc in docs {
            if let Some(filter) = &query.filter {
                if doc.fields.get(&filter.field) != Some(&filter.value) {
                    continue;
                }
            }

            let Some(vector) = doc.vectors.get(&query.field) else {
                continue;
            };
            if vector.len() != query.vector.len() {
                return Err(RagError::invalid_argument(format!(
                    "vector field '{}' of document '{}' has {} dimensions, query has {}",
                    query.field,
                    doc.id,
                    vector.len(),
                    query.vector.len()
                )));
            }

            hits.push(Hit::new(
                doc.id.clone(),
                cosine_similarity(&query.vector, vector),
            ));
        }

        rank_hits(&mut hits, query.k);

        debug!(
            "k-NN search on '{}.{}' returned {} hits",
            query.index,
            query.field,
            hits.len()
        );

        Ok(hits)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}
