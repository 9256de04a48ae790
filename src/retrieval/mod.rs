//! Multi-source retrieval: fan-out, normalization, weighting, aggregation, reranking
//!
//! Query flow: `QueryDispatcher` → backends → `ResultNormalizer` →
//! `WeightedScorer` → `aggregate` → `Reranker` → `SearchResponse`.

mod aggregation;
mod hybrid;
mod normalizer;
mod reranker;
mod result;
mod scoring;
mod weights;

pub use aggregation::{aggregate, rank_order, AggregatedCandidate, AggregationOptions};
pub use hybrid::{CorpusNames, PipelineOptions, QueryDispatcher, SearchResponse};
pub use normalizer::{
    parse_date, relevance_from_bm25, similarity_from_distance, NormalizeError, NormalizeOptions,
    ResultNormalizer,
};
pub use reranker::{
    FastEmbedRelevanceModel, RankedCandidate, RelevanceModel, RerankError, RerankOptions,
    RerankOutcome, Reranker,
};
pub use result::{BackendKind, DocType, ResultSource, ScoredResult, SearchResult};
pub use scoring::{composite_score, recency_factor, WeightedScorer, RECENCY_FLOOR};
pub use weights::{WeightConfigStore, WeightError, WeightProfile, WeightUpdate};

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest `top_k` accepted when no other bound is configured
pub const DEFAULT_MAX_TOP_K: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid weight override: {}", weights::describe(.0))]
    InvalidWeights(Vec<ValidationError>),

    #[error("No search backend answered: {}", .warnings.join("; "))]
    AllBackendsFailed { warnings: Vec<String> },
}

/// Which backends a query fans out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Combined,
    Vector,
    Fulltext,
}

impl SearchMode {
    /// Every (backend, corpus) pair this mode queries
    pub fn sources(&self) -> Vec<ResultSource> {
        ResultSource::ALL
            .into_iter()
            .filter(|source| match self {
                SearchMode::Combined => true,
                SearchMode::Vector => source.backend() == BackendKind::Vector,
                SearchMode::Fulltext => source.backend() == BackendKind::Fulltext,
            })
            .collect()
    }
}

impl std::str::FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "combined" => Ok(SearchMode::Combined),
            "vector" => Ok(SearchMode::Vector),
            "fulltext" => Ok(SearchMode::Fulltext),
            other => Err(SearchError::InvalidQuery(format!(
                "unknown mode '{}', expected combined, vector or fulltext",
                other
            ))),
        }
    }
}

/// Which corpora a query searches
///
/// Parsed from `"all"` or a comma-separated list of `emails` and `documents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CollectionFilter {
    #[default]
    All,
    Emails,
    Documents,
}

impl CollectionFilter {
    pub fn admits(&self, doc_type: DocType) -> bool {
        match self {
            CollectionFilter::All => true,
            CollectionFilter::Emails => doc_type == DocType::Email,
            CollectionFilter::Documents => doc_type == DocType::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionFilter::All => "all",
            CollectionFilter::Emails => "emails",
            CollectionFilter::Documents => "documents",
        }
    }
}

impl std::str::FromStr for CollectionFilter {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut emails = false;
        let mut documents = false;

        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "all" => {
                    emails = true;
                    documents = true;
                }
                "emails" => emails = true,
                "documents" => documents = true,
                other => {
                    return Err(SearchError::InvalidQuery(format!(
                        "unknown collection '{}', expected all, emails or documents",
                        other
                    )))
                }
            }
        }

        match (emails, documents) {
            (true, true) => Ok(CollectionFilter::All),
            (true, false) => Ok(CollectionFilter::Emails),
            (false, true) => Ok(CollectionFilter::Documents),
            (false, false) => Err(SearchError::InvalidQuery(
                "collection_filter selects no collection".to_string(),
            )),
        }
    }
}

impl TryFrom<String> for CollectionFilter {
    type Error = SearchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CollectionFilter> for String {
    fn from(filter: CollectionFilter) -> Self {
        filter.as_str().to_string()
    }
}

/// A fully specified query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    pub mode: SearchMode,

    /// Tolerate one edit per term in full-text matching
    pub fuzzy: bool,

    /// Minimum normalized vector similarity, in [0, 1]
    pub similarity_threshold: f64,

    pub use_reranking: bool,

    /// Maximum number of results
    pub top_k: usize,

    #[serde(default)]
    pub collection_filter: CollectionFilter,

    /// Applied on top of the active profile for this query only
    #[serde(default)]
    pub weights: Option<WeightUpdate>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            mode: SearchMode::Combined,
            fuzzy: true,
            similarity_threshold: 0.0,
            use_reranking: true,
            top_k,
            collection_filter: CollectionFilter::All,
            weights: None,
        }
    }

    /// (backend, corpus) pairs selected by both the mode and the collection filter
    pub fn sources(&self) -> Vec<ResultSource> {
        self.mode
            .sources()
            .into_iter()
            .filter(|source| self.collection_filter.admits(source.doc_type()))
            .collect()
    }

    pub fn validate(&self, max_top_k: usize) -> Result<(), SearchError> {
        if self.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(SearchError::InvalidQuery("top_k must be >= 1".to_string()));
        }
        if self.top_k > max_top_k {
            return Err(SearchError::InvalidQuery(format!(
                "top_k must be <= {}, got {}",
                max_top_k, self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SearchError::InvalidQuery(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}
