//! Collapse chunk-level hits and cross-backend duplicates into one candidate per document

use crate::retrieval::{DocType, ResultSource, ScoredResult, SearchResult};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Multi-chunk reward settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationOptions {
    /// Fractional bonus per additional distinct matching chunk
    pub chunk_bonus: f64,
    /// Upper bound on the total fractional bonus
    pub chunk_bonus_cap: f64,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            chunk_bonus: 0.05,
            chunk_bonus_cap: 0.25,
        }
    }
}

impl AggregationOptions {
    /// Multiplier applied to the best chunk's composite
    pub fn bonus_multiplier(&self, distinct_chunks: usize) -> f64 {
        let extra = distinct_chunks.saturating_sub(1) as f64;
        1.0 + (self.chunk_bonus * extra).min(self.chunk_bonus_cap).max(0.0)
    }
}

/// One document-level result after chunk and source collapse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedCandidate {
    /// Highest-scoring hit, used for the snippet and metadata
    pub representative: SearchResult,
    /// Every hit that contributed, best first
    pub contributors: Vec<ScoredResult>,
    /// Composite of the representative hit
    pub best_composite: f64,
    /// Document score including the multi-chunk bonus
    pub composite: f64,
    /// Distinct chunk positions that matched
    pub matched_chunks: usize,
}

impl AggregatedCandidate {
    pub fn doc_id(&self) -> &str {
        &self.representative.doc_id
    }

    /// Distinct sources that returned this document
    pub fn sources(&self) -> Vec<ResultSource> {
        let mut sources: Vec<ResultSource> = self.contributors.iter().map(|c| c.result.source).collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

impl From<AggregatedCandidate> for ScoredResult {
    fn from(candidate: AggregatedCandidate) -> Self {
        ScoredResult::new(candidate.representative, candidate.composite)
    }
}

/// Deterministic ranking order: score descending, then earliest chunk, then doc id
pub fn rank_order(a_score: f64, a: &SearchResult, b_score: f64, b: &SearchResult) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
        .then_with(|| a.doc_type.cmp(&b.doc_type))
}

/// Better of two hits for the same chunk; equal scores keep the lower source tag
fn outranks(candidate: &ScoredResult, current: &ScoredResult) -> bool {
    match candidate.composite.total_cmp(&current.composite) {
        Ordering::Greater => true,
        Ordering::Equal => candidate.result.source < current.result.source,
        Ordering::Less => false,
    }
}

/// Group scored hits by document and return one ranked candidate per document
///
/// Hits of the same chunk from different backends collapse to the higher
/// composite. Distinct chunks of one document add a bounded bonus on top of
/// the best chunk's composite.
pub fn aggregate(results: Vec<ScoredResult>, options: &AggregationOptions) -> Vec<AggregatedCandidate> {
    let mut documents: BTreeMap<(DocType, String), Vec<ScoredResult>> = BTreeMap::new();
    for scored in results {
        if scored.result.doc_id.is_empty() {
            tracing::warn!("Dropping {} hit without a document id", scored.result.source);
            continue;
        }
        documents
            .entry((scored.result.doc_type, scored.result.doc_id.clone()))
            .or_default()
            .push(scored);
    }

    let mut candidates: Vec<AggregatedCandidate> = documents
        .into_values()
        .filter_map(|contributors| collapse_document(contributors, options))
        .collect();

    candidates.sort_by(|a, b| rank_order(a.composite, &a.representative, b.composite, &b.representative));
    candidates
}

fn collapse_document(mut contributors: Vec<ScoredResult>, options: &AggregationOptions) -> Option<AggregatedCandidate> {
    let mut best_per_chunk: BTreeMap<Option<u32>, &ScoredResult> = BTreeMap::new();
    for scored in &contributors {
        best_per_chunk
            .entry(scored.result.chunk_index)
            .and_modify(|current| {
                if outranks(scored, *current) {
                    *current = scored;
                }
            })
            .or_insert(scored);
    }

    let matched_chunks = best_per_chunk.len();

    // Ascending chunk order, so a tie keeps the earliest chunk
    let mut representative: Option<&ScoredResult> = None;
    for scored in best_per_chunk.into_values() {
        if representative.map_or(true, |best| scored.composite > best.composite) {
            representative = Some(scored);
        }
    }
    let representative = representative?.clone();

    contributors.sort_by(|a, b| {
        rank_order(a.composite, &a.result, b.composite, &b.result)
            .then_with(|| a.result.source.cmp(&b.result.source))
    });

    Some(AggregatedCandidate {
        composite: representative.composite * options.bonus_multiplier(matched_chunks),
        best_composite: representative.composite,
        representative: representative.result,
        contributors,
        matched_chunks,
    })
}
