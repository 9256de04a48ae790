//! Cross-encoder reranking with composite-score fallback

use crate::retrieval::aggregation::rank_order;
use crate::retrieval::AggregatedCandidate;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Scores (query, document) pairs jointly
///
/// Implementations are synchronous and may be CPU or GPU bound; the
/// `Reranker` runs them off the async executor.
pub trait RelevanceModel: Send + Sync {
    /// Raw relevance logits, one per document, in input order
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

/// FastEmbed cross-encoder
pub struct FastEmbedRelevanceModel {
    model: TextRerank,
    model_name: String,
}

impl FastEmbedRelevanceModel {
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jinaai/jina-reranker-v1-turbo-en" | "jina-reranker-v1-turbo-en" => {
                RerankerModel::JINARerankerV1TurboEn
            }
            _ => {
                return Err(RerankError::InitializationError(format!(
                    "Unsupported reranker model: {}. Supported: BAAI/bge-reranker-base, jinaai/jina-reranker-v1-turbo-en",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(false);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
        })
    }
}

impl RelevanceModel for FastEmbedRelevanceModel {
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if query.trim().is_empty() {
            return Err(RerankError::InvalidInput("Query cannot be empty".to_string()));
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();
        let results = self
            .model
            .rerank(query, docs, false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // fastembed returns results sorted by score; put them back in input order
        let mut scores = vec![f32::NAN; documents.len()];
        for r in results {
            if let Some(slot) = scores.get_mut(r.index) {
                *slot = r.score;
            }
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(RerankError::RerankingError(
                "model did not score every candidate".to_string(),
            ));
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn sigmoid(logit: f32) -> f64 {
    1.0 / (1.0 + (-f64::from(logit)).exp())
}

#[derive(Debug, Clone, Copy)]
pub struct RerankOptions {
    /// Upper bound on candidates sent to the model
    pub candidates_limit: usize,
    pub timeout: Duration,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            candidates_limit: 50,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One final result with its ranking evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: AggregatedCandidate,
    /// Cross-encoder relevance in [0, 1], absent when reranking did not run
    pub relevance: Option<f64>,
    /// Final ranking score
    pub score: f64,
}

impl RankedCandidate {
    fn by_composite(candidate: AggregatedCandidate) -> Self {
        Self {
            score: candidate.composite,
            relevance: None,
            candidate,
        }
    }
}

/// Ranked output plus the warning to surface when reranking was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub ranked: Vec<RankedCandidate>,
    pub warning: Option<String>,
}

/// Blends cross-encoder relevance into the composite ordering
pub struct Reranker {
    model: Option<Arc<dyn RelevanceModel>>,
    options: RerankOptions,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, options: RerankOptions) -> Self {
        Self {
            model: Some(model),
            options,
        }
    }

    /// Reranker with no model; always orders by composite score
    pub fn disabled() -> Self {
        Self {
            model: None,
            options: RerankOptions::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.model_name())
    }

    /// Rerank the best `min(top_k, candidates_limit)` candidates
    ///
    /// `candidates` must already be in composite order. Never fails: when the
    /// model is missing, errors or times out, the composite ordering is kept
    /// and a warning is returned instead.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<AggregatedCandidate>,
        top_k: usize,
        reranker_weight: f64,
        requested: bool,
    ) -> RerankOutcome {
        candidates.truncate(top_k);

        if !requested || candidates.is_empty() {
            return Self::fallback(candidates, None);
        }

        let Some(model) = self.model.as_ref().map(Arc::clone) else {
            return Self::fallback(
                candidates,
                Some("Reranker unavailable; results ordered by composite score".to_string()),
            );
        };

        let pool_size = top_k.min(self.options.candidates_limit).min(candidates.len());
        let tail = candidates.split_off(pool_size);
        let pool = candidates;

        let query_text = query.to_string();
        let documents: Vec<String> = pool.iter().map(|c| c.representative.snippet.clone()).collect();
        let expected = documents.len();

        // A timed-out blocking call keeps running detached; its result is discarded
        let task = tokio::task::spawn_blocking(move || model.score(&query_text, &documents));
        let logits = match tokio::time::timeout(self.options.timeout, task).await {
            Ok(Ok(Ok(logits))) if logits.len() == expected => logits,
            Ok(Ok(Ok(logits))) => {
                return Self::fallback_with_tail(
                    pool,
                    tail,
                    format!(
                        "Reranker returned {} scores for {} candidates; results ordered by composite score",
                        logits.len(),
                        expected
                    ),
                );
            }
            Ok(Ok(Err(e))) => {
                return Self::fallback_with_tail(
                    pool,
                    tail,
                    format!("Reranker failed ({}); results ordered by composite score", e),
                );
            }
            Ok(Err(e)) => {
                return Self::fallback_with_tail(
                    pool,
                    tail,
                    format!("Reranker task failed ({}); results ordered by composite score", e),
                );
            }
            Err(_) => {
                return Self::fallback_with_tail(
                    pool,
                    tail,
                    format!(
                        "Reranker timed out after {} ms; results ordered by composite score",
                        self.options.timeout.as_millis()
                    ),
                );
            }
        };

        let weight = reranker_weight.clamp(0.0, 1.0);
        let mut ranked: Vec<RankedCandidate> = pool
            .into_iter()
            .zip(logits)
            .map(|(candidate, logit)| {
                let relevance = sigmoid(logit);
                RankedCandidate {
                    score: weight * relevance + (1.0 - weight) * candidate.composite,
                    relevance: Some(relevance),
                    candidate,
                }
            })
            .collect();
        ranked.sort_by(|a, b| rank_order(a.score, &a.candidate.representative, b.score, &b.candidate.representative));

        tracing::debug!("Reranked {} candidates", ranked.len());

        // The tail keeps composite order below the pool; its score never exceeds the pool's last
        let floor = ranked.last().map_or(f64::INFINITY, |r| r.score);
        ranked.extend(tail.into_iter().map(|candidate| {
            let mut ranked = RankedCandidate::by_composite(candidate);
            ranked.score = ranked.score.min(floor);
            ranked
        }));
        RerankOutcome { ranked, warning: None }
    }

    pub(crate) fn fallback(candidates: Vec<AggregatedCandidate>, warning: Option<String>) -> RerankOutcome {
        if let Some(w) = &warning {
            tracing::warn!("{}", w);
        }
        RerankOutcome {
            ranked: candidates.into_iter().map(RankedCandidate::by_composite).collect(),
            warning,
        }
    }

    fn fallback_with_tail(
        mut pool: Vec<AggregatedCandidate>,
        tail: Vec<AggregatedCandidate>,
        warning: String,
    ) -> RerankOutcome {
        pool.extend(tail);
        Self::fallback(pool, Some(warning))
    }
}
