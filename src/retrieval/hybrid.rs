//! Query dispatch: concurrent backend fan-out feeding the ranking pipeline

use crate::backends::{FullTextSearchBackend, RawHit, VectorSearchBackend};
use crate::retrieval::{
    aggregate, AggregationOptions, BackendKind, DocType, NormalizeOptions, RankedCandidate,
    ResultNormalizer, ResultSource, Reranker, SearchError, SearchQuery, SearchResult,
    WeightConfigStore, WeightError, WeightProfile, WeightedScorer, DEFAULT_MAX_TOP_K,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Collection and index identifiers per corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusNames {
    pub email_collection: String,
    pub document_collection: String,
    pub email_index: String,
    pub document_index: String,
}

impl Default for CorpusNames {
    fn default() -> Self {
        Self {
            email_collection: "emails".to_string(),
            document_collection: "documents".to_string(),
            email_index: "emails".to_string(),
            document_index: "documents".to_string(),
        }
    }
}

impl CorpusNames {
    /// Backend-side name for a source
    pub fn for_source(&self, source: ResultSource) -> &str {
        match (source.backend(), source.doc_type()) {
            (BackendKind::Vector, DocType::Email) => &self.email_collection,
            (BackendKind::Vector, DocType::Document) => &self.document_collection,
            (BackendKind::Fulltext, DocType::Email) => &self.email_index,
            (BackendKind::Fulltext, DocType::Document) => &self.document_index,
        }
    }
}

/// Everything the pipeline needs besides the backends and weights
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub corpora: CorpusNames,
    /// Per-source fetch limit is `top_k * search_multiplier`
    pub search_multiplier: usize,
    /// Queries asking for more results are rejected
    pub max_top_k: usize,
    pub normalize: NormalizeOptions,
    pub aggregation: AggregationOptions,
    pub backend_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            corpora: CorpusNames::default(),
            search_multiplier: 2,
            max_top_k: DEFAULT_MAX_TOP_K,
            normalize: NormalizeOptions::default(),
            aggregation: AggregationOptions::default(),
            backend_timeout: Duration::from_millis(5_000),
            query_timeout: Duration::from_millis(15_000),
        }
    }
}

/// Ranked results for one query plus any degradation warnings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RankedCandidate>,
    pub warnings: Vec<String>,
    /// Profile the results were scored with, including any per-query override
    pub weights: WeightProfile,
}

/// Thin entry point for the retrieval pipeline
pub struct QueryDispatcher {
    vector: Arc<dyn VectorSearchBackend>,
    fulltext: Arc<dyn FullTextSearchBackend>,
    weights: Arc<WeightConfigStore>,
    reranker: Arc<Reranker>,
    options: PipelineOptions,
}

impl QueryDispatcher {
    pub fn new(
        vector: Arc<dyn VectorSearchBackend>,
        fulltext: Arc<dyn FullTextSearchBackend>,
        weights: Arc<WeightConfigStore>,
        reranker: Arc<Reranker>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            vector,
            fulltext,
            weights,
            reranker,
            options,
        }
    }

    pub fn weights(&self) -> &Arc<WeightConfigStore> {
        &self.weights
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run one query through fan-out, normalization, scoring, aggregation and reranking
    ///
    /// Fails only for an invalid query or weight override, or when no source answered; any
    /// other degradation is reported in `SearchResponse::warnings`.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        query.validate(self.options.max_top_k)?;

        let deadline = Instant::now() + self.options.query_timeout;
        // One snapshot and one reference time for the whole query
        let profile = self
            .weights
            .resolve(query.weights.as_ref())
            .map_err(|WeightError::Invalid(fields)| SearchError::InvalidWeights(fields))?;
        let now = Utc::now();

        let sources = query.sources();
        let fetch_limit = query.top_k.saturating_mul(self.options.search_multiplier.max(1));

        // 1. Fan out to every (backend, corpus) pair concurrently
        let calls: Vec<_> = sources
            .iter()
            .map(|&source| async move {
                let outcome = self.fetch(source, query, fetch_limit, deadline).await;
                (source, outcome)
            })
            .collect();
        let outcomes = futures::future::join_all(calls).await;

        // 2. Normalize survivors, collect failures as warnings
        let mut warnings: Vec<String> = Vec::new();
        let mut normalized: Vec<SearchResult> = Vec::new();
        let mut answered = 0usize;

        for (source, outcome) in outcomes {
            match outcome {
                Ok(hits) => {
                    answered += 1;
                    tracing::debug!(source = %source, count = hits.len(), "source returned hits");
                    normalized.extend(self.normalize_hits(source, hits, query.similarity_threshold));
                }
                Err(message) => {
                    tracing::warn!(source = %source, error = %message, "source query failed");
                    warnings.push(format!("{}: {}", source, message));
                }
            }
        }

        if answered == 0 {
            return Err(SearchError::AllBackendsFailed { warnings });
        }

        // 3. Weight, then collapse chunks and cross-backend duplicates
        let scorer = WeightedScorer::new(Arc::clone(&profile), now);
        let candidates = aggregate(scorer.score_all(normalized), &self.options.aggregation);

        // 4. Rerank within whatever time the query has left
        let rerank = self.reranker.rerank(
            &query.text,
            candidates.clone(),
            query.top_k,
            profile.reranker_weight,
            query.use_reranking,
        );
        let outcome = match tokio::time::timeout_at(deadline, rerank).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let mut candidates = candidates;
                candidates.truncate(query.top_k);
                Reranker::fallback(
                    candidates,
                    Some("Query deadline reached before reranking finished; results ordered by composite score".to_string()),
                )
            }
        };
        if let Some(warning) = outcome.warning {
            warnings.push(warning);
        }

        tracing::info!(
            "Query '{}' ({:?}) returned {} results with {} warnings",
            query.text,
            query.mode,
            outcome.ranked.len(),
            warnings.len()
        );

        Ok(SearchResponse {
            query: query.text.clone(),
            results: outcome.ranked,
            warnings,
            weights: profile.as_ref().clone(),
        })
    }

    /// Query one source, bounded by the per-backend timeout and the query deadline
    async fn fetch(
        &self,
        source: ResultSource,
        query: &SearchQuery,
        limit: usize,
        deadline: Instant,
    ) -> Result<Vec<RawHit>, String> {
        let name = self.options.corpora.for_source(source);
        let started = Instant::now();
        let call_deadline = deadline.min(started + self.options.backend_timeout);

        let call = async {
            match source.backend() {
                BackendKind::Vector => self.vector.query(name, &query.text, limit).await,
                BackendKind::Fulltext => {
                    self.fulltext
                        .query(name, &query.text, limit, query.fuzzy)
                        .await
                }
            }
        };

        match tokio::time::timeout_at(call_deadline, call).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "timed out after {} ms",
                call_deadline.saturating_duration_since(started).as_millis()
            )),
        }
    }

    fn normalize_hits(&self, source: ResultSource, hits: Vec<RawHit>, threshold: f64) -> Vec<SearchResult> {
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match source.normalize(hit, &self.options.normalize) {
                Ok(result) => {
                    if source.backend() == BackendKind::Vector && result.score < threshold {
                        continue;
                    }
                    results.push(result);
                }
                Err(e) => tracing::warn!("Skipping hit: {}", e),
            }
        }
        results
    }
}
