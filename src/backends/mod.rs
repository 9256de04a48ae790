//! Retrieval backends
//!
//! The query pipeline only talks to the two traits defined here. The
//! concrete implementations are local defaults:
//! - `HnswVectorBackend`: embeddings (via an `EmbeddingProvider`) in per-collection HNSW graphs
//! - `TantivyTextBackend`: per-corpus Tantivy inverted indexes with BM25 ranking

mod embedding;
mod keyword_index;
mod vector_index;

pub use embedding::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use keyword_index::{TantivyTextBackend, TextIndex};
pub use vector_index::{HnswParams, HnswVectorBackend};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unknown collection or index: {0}")]
    UnknownCollection(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One hit exactly as a backend returns it
///
/// `score` is backend-native: cosine distance (lower is closer) for vector
/// backends, BM25 relevance (higher is better) for full-text backends.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl RawHit {
    pub fn new(id: impl Into<String>, score: f32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            score,
            text: text.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Semantic similarity engine
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    /// Nearest stored items to `text` in `collection`, closest first
    async fn query(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<RawHit>, BackendError>;

    /// Store an item in `collection`
    async fn add(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), BackendError>;
}

/// Inverted-index lexical engine
#[async_trait]
pub trait FullTextSearchBackend: Send + Sync {
    /// Best lexical matches for `text` in `index`, most relevant first
    async fn query(
        &self,
        index: &str,
        text: &str,
        limit: usize,
        fuzzy: bool,
    ) -> Result<Vec<RawHit>, BackendError>;

    /// Store a document in `index`
    async fn add(
        &self,
        index: &str,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), BackendError>;
}
