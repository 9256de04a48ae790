//! Canonical search result records shared by every stage of the query pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which retrieval engine produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vector,
    Fulltext,
}

/// Which corpus a hit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Email,
    Document,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Email => "email",
            DocType::Document => "document",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Originating backend and corpus of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSource {
    VectorEmail,
    VectorDocument,
    FulltextEmail,
    FulltextDocument,
}

impl ResultSource {
    pub const ALL: [ResultSource; 4] = [
        ResultSource::VectorEmail,
        ResultSource::VectorDocument,
        ResultSource::FulltextEmail,
        ResultSource::FulltextDocument,
    ];

    pub fn new(backend: BackendKind, doc_type: DocType) -> Self {
        match (backend, doc_type) {
            (BackendKind::Vector, DocType::Email) => ResultSource::VectorEmail,
            (BackendKind::Vector, DocType::Document) => ResultSource::VectorDocument,
            (BackendKind::Fulltext, DocType::Email) => ResultSource::FulltextEmail,
            (BackendKind::Fulltext, DocType::Document) => ResultSource::FulltextDocument,
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            ResultSource::VectorEmail | ResultSource::VectorDocument => BackendKind::Vector,
            ResultSource::FulltextEmail | ResultSource::FulltextDocument => BackendKind::Fulltext,
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            ResultSource::VectorEmail | ResultSource::FulltextEmail => DocType::Email,
            ResultSource::VectorDocument | ResultSource::FulltextDocument => DocType::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::VectorEmail => "vector-email",
            ResultSource::VectorDocument => "vector-document",
            ResultSource::FulltextEmail => "fulltext-email",
            ResultSource::FulltextDocument => "fulltext-document",
        }
    }
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved unit (an email, or one chunk of a document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Originating backend and corpus
    pub source: ResultSource,

    pub doc_type: DocType,

    /// Parent document id (for chunked documents, not the chunk id)
    pub doc_id: String,

    /// Matched text excerpt
    pub snippet: String,

    /// Normalized relevance in [0, 1], higher is better
    pub score: f64,

    /// Score exactly as the backend reported it
    pub raw_score: f64,

    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub url: Option<String>,

    /// Email sender
    pub from_field: Option<String>,
    /// Email subject
    pub subject: Option<String>,

    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publisher_id: Option<String>,

    /// Source-specific fields with no dedicated slot
    #[serde(default)]
    pub additional_metadata: Map<String, Value>,

    pub chunk_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub total_chunks: Option<u32>,
}

impl SearchResult {
    /// Create a result with only the required fields set
    pub fn new(source: ResultSource, doc_id: impl Into<String>, snippet: impl Into<String>, score: f64) -> Self {
        Self {
            source,
            doc_type: source.doc_type(),
            doc_id: doc_id.into(),
            snippet: snippet.into(),
            score,
            raw_score: score,
            title: None,
            date: None,
            url: None,
            from_field: None,
            subject: None,
            author: None,
            publisher: None,
            publisher_id: None,
            additional_metadata: Map::new(),
            chunk_id: None,
            chunk_index: None,
            total_chunks: None,
        }
    }

    /// Get a short preview of the snippet (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.snippet.chars().count() <= max_chars {
            self.snippet.clone()
        } else {
            let head: String = self.snippet.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }

    /// Display label: title for documents, subject for emails
    pub fn label(&self) -> Option<&str> {
        self.title.as_deref().or(self.subject.as_deref())
    }
}

/// A normalized result together with its weighted composite score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub result: SearchResult,
    pub composite: f64,
}

impl ScoredResult {
    pub fn new(result: SearchResult, composite: f64) -> Self {
        Self { result, composite }
    }
}
