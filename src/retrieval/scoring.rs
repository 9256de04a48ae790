//! Composite scoring: normalized score × backend weight × collection weight × recency

use crate::retrieval::{ScoredResult, SearchResult, WeightProfile};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Lowest value the recency factor can reach, however old the result
pub const RECENCY_FLOOR: f64 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Recency multiplier in [RECENCY_FLOOR, 1]
///
/// `F + (1 - F) * exp(-recency_weight * age_days / recency_decay_days)`.
/// Exactly 1.0 for undated results, for results dated now or in the future,
/// and whenever `recency_weight` is 0.
pub fn recency_factor(date: Option<DateTime<Utc>>, profile: &WeightProfile, now: DateTime<Utc>) -> f64 {
    let Some(date) = date else {
        return 1.0;
    };
    if profile.recency_weight <= 0.0 {
        return 1.0;
    }

    let age_days = ((now - date).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    if age_days == 0.0 {
        return 1.0;
    }

    let decay_days = profile.recency_decay_days.max(1) as f64;
    let decay = (-profile.recency_weight * age_days / decay_days).exp();
    RECENCY_FLOOR + (1.0 - RECENCY_FLOOR) * decay
}

/// Weighted score of one normalized result, before aggregation and reranking
pub fn composite_score(result: &SearchResult, profile: &WeightProfile, now: DateTime<Utc>) -> f64 {
    result.score
        * profile.backend_weight(result.source.backend())
        * profile.collection_weight(result.doc_type)
        * recency_factor(result.date, profile, now)
}

/// Scores results against one profile snapshot and one reference time
///
/// A query builds one scorer so every result sees the same profile and the
/// same "now".
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    profile: Arc<WeightProfile>,
    now: DateTime<Utc>,
}

impl WeightedScorer {
    pub fn new(profile: Arc<WeightProfile>, now: DateTime<Utc>) -> Self {
        Self { profile, now }
    }

    pub fn profile(&self) -> &WeightProfile {
        &self.profile
    }

    pub fn score(&self, result: SearchResult) -> ScoredResult {
        let composite = composite_score(&result, &self.profile, self.now);
        ScoredResult::new(result, composite)
    }

    pub fn score_all(&self, results: Vec<SearchResult>) -> Vec<ScoredResult> {
        results.into_iter().map(|r| self.score(r)).collect()
    }
}
