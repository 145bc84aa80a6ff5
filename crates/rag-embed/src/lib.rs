//! rag-embed - text embedders
//!
//! This crate provides embedders for the vector leg of hybrid search.
//!
//! # Features
//!
//! - Feature hashing of word tokens, no model files needed
//! - Support for asymmetric retrieval with query/passage prefixes
//! - L2 normalization

mod hashing;

pub use hashing::HashingEmbedder;

// Re-export the Embedder trait for convenience
pub use rag_core::Embedder;
