//! rag-core - Core types and traits for hybrid retrieval
//!
//! This crate provides the error taxonomy, configuration, shared types and the
//! collaborator traits (search backend, embedding provider) used throughout
//! the rag-fusion workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
