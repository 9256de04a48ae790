//! Near-duplicate detection and document commit

use super::{DuplicateError, IngestCandidate, PendingIngestions};
use crate::backends::{FullTextSearchBackend, VectorSearchBackend};
use crate::retrieval::{CorpusNames, NormalizeOptions, ResultNormalizer, ResultSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOptions {
    /// Best-match similarity (percent) above which a document is flagged
    pub threshold_percent: f64,
    /// Nearest existing entries to inspect
    pub neighbours: usize,
    /// Leading characters of the candidate used as the similarity probe
    pub excerpt_chars: usize,
    /// Chunk size for committed documents, in characters
    pub chunk_chars: usize,
    /// Hours a flagged candidate waits for review before it is dropped; 0 keeps it forever
    pub pending_max_age_hours: u64,
}

impl IngestOptions {
    pub fn pending_max_age(&self) -> Option<chrono::Duration> {
        match self.pending_max_age_hours {
            0 => None,
            // A century is effectively forever and keeps the conversion in range
            hours => Some(chrono::Duration::hours(hours.min(24 * 365 * 100) as i64)),
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            threshold_percent: 85.0,
            neighbours: 5,
            excerpt_chars: 2000,
            chunk_chars: 1000,
            pending_max_age_hours: 24,
        }
    }
}

/// An existing document close to the candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarDocument {
    pub doc_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub similarity_percent: f64,
}

/// Result of the similarity check
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    /// Nothing close enough; `best_percent` is the closest match, if any
    Clear { best_percent: Option<f64> },
    /// At least one existing document exceeds the threshold, best first
    Flagged { similar: Vec<SimilarDocument> },
}

impl DuplicateCheck {
    pub fn is_flagged(&self) -> bool {
        matches!(self, DuplicateCheck::Flagged { .. })
    }
}

/// What happened to a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestOutcome {
    Committed {
        doc_id: String,
        chunks: usize,
    },
    Flagged {
        pending_id: Uuid,
        similar: Vec<SimilarDocument>,
    },
}

/// Split text into trimmed chunks of at most `chunk_chars` characters
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Checks new documents against the document collection and commits them
pub struct DuplicateDetector {
    vector: Arc<dyn VectorSearchBackend>,
    fulltext: Arc<dyn FullTextSearchBackend>,
    corpora: CorpusNames,
    options: IngestOptions,
    pending: PendingIngestions,
}

impl DuplicateDetector {
    pub fn new(
        vector: Arc<dyn VectorSearchBackend>,
        fulltext: Arc<dyn FullTextSearchBackend>,
        corpora: CorpusNames,
        options: IngestOptions,
    ) -> Self {
        Self {
            vector,
            fulltext,
            corpora,
            options,
            pending: PendingIngestions::with_max_age(options.pending_max_age()),
        }
    }

    pub fn pending(&self) -> &PendingIngestions {
        &self.pending
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Compare the candidate's excerpt with its nearest existing documents
    pub async fn check(&self, candidate: &IngestCandidate) -> Result<DuplicateCheck, DuplicateError> {
        if candidate.text.trim().is_empty() {
            return Err(DuplicateError::EmptyDocument);
        }

        let excerpt: String = candidate.text.chars().take(self.options.excerpt_chars).collect();
        let hits = self
            .vector
            .query(&self.corpora.document_collection, &excerpt, self.options.neighbours)
            .await?;

        // Several chunks of one document may match; keep each document's best
        let normalize = NormalizeOptions::default();
        let mut similar: Vec<SimilarDocument> = Vec::new();
        for hit in hits {
            let result = match ResultSource::VectorDocument.normalize(hit, &normalize) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Skipping neighbour: {}", e);
                    continue;
                }
            };
            let percent = result.score * 100.0;
            if let Some(existing) = similar.iter_mut().find(|s| s.doc_id == result.doc_id) {
                if percent > existing.similarity_percent {
                    existing.similarity_percent = percent;
                }
                continue;
            }
            similar.push(SimilarDocument {
                doc_id: result.doc_id,
                title: result.title,
                author: result.author,
                publisher: result.publisher,
                date: result.date,
                similarity_percent: percent,
            });
        }
        similar.sort_by(|a, b| {
            b.similarity_percent
                .total_cmp(&a.similarity_percent)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        let best_percent = similar.first().map(|s| s.similarity_percent);
        let threshold = self.options.threshold_percent;

        match best_percent {
            Some(best) if best > threshold => {
                similar.retain(|s| s.similarity_percent > threshold);
                tracing::info!(
                    "Candidate flagged: best match {} at {:.1}% (threshold {:.1}%)",
                    similar[0].doc_id,
                    best,
                    threshold
                );
                Ok(DuplicateCheck::Flagged { similar })
            }
            _ => {
                tracing::debug!("Candidate clear, best match {:?}%", best_percent);
                Ok(DuplicateCheck::Clear { best_percent })
            }
        }
    }

    /// Check, then commit a clear candidate or park a flagged one
    pub async fn submit(&self, candidate: IngestCandidate) -> Result<IngestOutcome, DuplicateError> {
        match self.check(&candidate).await? {
            DuplicateCheck::Clear { .. } => {
                let (doc_id, chunks) = self.commit(&candidate).await?;
                Ok(IngestOutcome::Committed { doc_id, chunks })
            }
            DuplicateCheck::Flagged { similar } => {
                let pending_id = self.pending.park(candidate, similar.clone());
                tracing::info!("Parked flagged candidate as {}", pending_id);
                Ok(IngestOutcome::Flagged { pending_id, similar })
            }
        }
    }

    /// Operator override: commit a flagged candidate despite the match
    pub async fn proceed(&self, pending_id: Uuid) -> Result<IngestOutcome, DuplicateError> {
        let entry = self
            .pending
            .take(&pending_id)
            .ok_or(DuplicateError::UnknownPending(pending_id))?;

        match self.commit(&entry.candidate).await {
            Ok((doc_id, chunks)) => {
                tracing::info!("Operator committed flagged candidate {} as {}", pending_id, doc_id);
                Ok(IngestOutcome::Committed { doc_id, chunks })
            }
            Err(e) => {
                self.pending.restore(entry);
                Err(e)
            }
        }
    }

    /// Operator decision: discard a flagged candidate
    pub fn cancel(&self, pending_id: Uuid) -> Result<IngestCandidate, DuplicateError> {
        let entry = self
            .pending
            .take(&pending_id)
            .ok_or(DuplicateError::UnknownPending(pending_id))?;
        tracing::info!("Operator cancelled flagged candidate {}", pending_id);
        Ok(entry.candidate)
    }

    /// Write every chunk to the vector collection and the full-text index
    ///
    /// Returns the document id and the number of chunks written.
    pub async fn commit(&self, candidate: &IngestCandidate) -> Result<(String, usize), DuplicateError> {
        let chunks = chunk_text(&candidate.text, self.options.chunk_chars);
        if chunks.is_empty() {
            return Err(DuplicateError::EmptyDocument);
        }

        let doc_id = candidate.doc_id();
        let base = candidate.base_metadata();
        let total = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_id = format!("{}-{}", doc_id, index);
            let mut metadata = base.clone();
            metadata.insert("chunk_id".to_string(), Value::from(chunk_id.clone()));
            metadata.insert("chunk_number".to_string(), Value::from(index));
            metadata.insert("total_chunks".to_string(), Value::from(total));

            self.vector
                .add(&self.corpora.document_collection, &chunk_id, chunk, metadata.clone())
                .await?;
            self.fulltext
                .add(&self.corpora.document_index, &chunk_id, chunk, metadata)
                .await?;
        }

        tracing::info!("Committed document {} ({} chunks)", doc_id, total);
        Ok((doc_id, total))
    }
}
