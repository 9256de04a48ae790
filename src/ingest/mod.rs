//! Document ingestion with near-duplicate review
//!
//! A submitted document is similarity-checked against the document
//! collection. Clear documents are committed straight away; flagged ones are
//! parked until an operator proceeds or cancels.

mod duplicate;
mod pending;

pub use duplicate::{
    chunk_text, DuplicateCheck, DuplicateDetector, IngestOptions, IngestOutcome, SimilarDocument,
};
pub use pending::{PendingIngestion, PendingIngestions};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DuplicateError {
    #[error("Document text is empty")]
    EmptyDocument,

    #[error("No pending ingestion with id {0}")]
    UnknownPending(Uuid),

    #[error("Backend error: {0}")]
    Backend(#[from] crate::backends::BackendError),
}

/// A document submitted for ingestion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngestCandidate {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publisher_id: Option<String>,
    /// Publication date as written by the submitter
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl IngestCandidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Content-addressed id: BLAKE3 hex digest of the text
    pub fn doc_id(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }

    /// Metadata stored with every chunk of this document
    pub(crate) fn base_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("hash".to_string(), Value::from(self.doc_id()));
        let optional = [
            ("title", &self.title),
            ("author", &self.author),
            ("publisher", &self.publisher),
            ("publisher_id", &self.publisher_id),
            ("publication_date", &self.date),
            ("url", &self.url),
        ];
        for (key, value) in optional {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), Value::from(v));
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_is_stable_content_hash() {
        let a = IngestCandidate::new("same text");
        let mut b = IngestCandidate::new("same text");
        b.title = Some("Different title".to_string());
        assert_eq!(a.doc_id(), b.doc_id());
        assert_eq!(a.doc_id().len(), 64);
        assert_ne!(a.doc_id(), IngestCandidate::new("other text").doc_id());
    }

    #[test]
    fn base_metadata_skips_blank_fields() {
        let mut c = IngestCandidate::new("body");
        c.title = Some("Oscillators".to_string());
        c.author = Some("  ".to_string());
        c.date = Some("1998-02-01".to_string());

        let meta = c.base_metadata();
        assert_eq!(meta["hash"], c.doc_id());
        assert_eq!(meta["title"], "Oscillators");
        assert_eq!(meta["publication_date"], "1998-02-01");
        assert!(!meta.contains_key("author"));
        assert!(!meta.contains_key("url"));
    }

    #[test]
    fn candidate_deserializes_with_only_text() {
        let c: IngestCandidate = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(c, IngestCandidate::new("hello"));
    }
}
