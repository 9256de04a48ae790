//! Raw backend hits → canonical `SearchResult`
//!
//! Each `ResultSource` knows how to read its backend's payload. Missing or
//! malformed metadata never fails normalization; the field is left empty
//! and a warning is logged.

use crate::backends::RawHit;
use crate::retrieval::{BackendKind, DocType, ResultSource, SearchResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("{0} hit has no document id")]
    MissingId(ResultSource),
}

/// Knobs that shape normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// BM25 score that maps to 0.5 relevance
    pub bm25_saturation: f64,
    /// Maximum snippet length in characters
    pub snippet_chars: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            bm25_saturation: 8.0,
            snippet_chars: 500,
        }
    }
}

/// Maps one backend's raw hit into the canonical record
pub trait ResultNormalizer {
    fn normalize(&self, hit: RawHit, options: &NormalizeOptions) -> Result<SearchResult, NormalizeError>;
}

impl ResultNormalizer for ResultSource {
    fn normalize(&self, hit: RawHit, options: &NormalizeOptions) -> Result<SearchResult, NormalizeError> {
        let RawHit {
            id,
            score: raw,
            text,
            mut metadata,
        } = hit;
        let raw = f64::from(raw);

        let score = match self.backend() {
            BackendKind::Vector => similarity_from_distance(raw),
            BackendKind::Fulltext => relevance_from_bm25(raw, options.bm25_saturation),
        };

        // Content hash is the stable parent id; backend ids may name a chunk
        let doc_id = take_string(&mut metadata, "hash")
            .unwrap_or(id)
            .trim()
            .to_string();
        if doc_id.is_empty() {
            return Err(NormalizeError::MissingId(*self));
        }

        let mut result = SearchResult::new(*self, doc_id, truncate_chars(&text, options.snippet_chars), score);
        result.raw_score = raw;
        result.url = take_string(&mut metadata, "url");

        match self.doc_type() {
            DocType::Email => {
                result.from_field =
                    take_string(&mut metadata, "from_").or_else(|| take_string(&mut metadata, "from"));
                result.subject = take_string(&mut metadata, "subject");
                result.date = take_date(&mut metadata, "date");
            }
            DocType::Document => {
                result.title = take_string(&mut metadata, "title");
                result.author = take_string(&mut metadata, "author");
                result.publisher = take_string(&mut metadata, "publisher");
                result.publisher_id = take_string(&mut metadata, "publisher_id");
                result.date = match take_date(&mut metadata, "publication_date") {
                    Some(date) => {
                        metadata.remove("date");
                        Some(date)
                    }
                    None => take_date(&mut metadata, "date"),
                };
                result.chunk_id = take_string(&mut metadata, "chunk_id");
                result.chunk_index = take_u32(&mut metadata, "chunk_number")
                    .or_else(|| take_u32(&mut metadata, "chunk_index"));
                result.total_chunks = take_u32(&mut metadata, "total_chunks");

                if let (Some(index), Some(total)) = (result.chunk_index, result.total_chunks) {
                    if index >= total {
                        tracing::warn!(
                            "Chunk {} of {} is out of range for {}, dropping total_chunks",
                            index,
                            total,
                            result.doc_id
                        );
                        result.total_chunks = None;
                    }
                }
            }
        }

        result.additional_metadata = metadata;
        Ok(result)
    }
}

/// Cosine distance → similarity in [0, 1]
pub fn similarity_from_distance(distance: f64) -> f64 {
    if distance.is_finite() {
        (1.0 - distance).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Unbounded BM25 relevance → [0, 1) via `s / (s + k)`
pub fn relevance_from_bm25(score: f64, saturation: f64) -> f64 {
    if !score.is_finite() || score <= 0.0 {
        return 0.0;
    }
    score / (score + saturation.max(f64::EPSILON))
}

/// Parse the date layouts seen in email headers and document metadata
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%a %b %d %H:%M:%S %Z %Y"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        return raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());
    }

    None
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn take_string(metadata: &mut Map<String, Value>, key: &str) -> Option<String> {
    match metadata.remove(key)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => {
            tracing::warn!("Metadata field '{}' is not a scalar ({}), ignoring", key, other);
            None
        }
    }
}

fn take_u32(metadata: &mut Map<String, Value>, key: &str) -> Option<u32> {
    let value = metadata.remove(key)?;
    let parsed = match &value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        Value::Null => return None,
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!("Metadata field '{}' is not a chunk position: {}", key, value);
    }
    parsed
}

fn take_date(metadata: &mut Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let value = metadata.remove(key)?;
    let parsed = match &value {
        Value::String(s) if s.trim().is_empty() || s == "Unknown" => return None,
        Value::String(s) => parse_date(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::Null => return None,
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!("Unparseable '{}' in metadata: {}", key, value);
    }
    parsed
}
