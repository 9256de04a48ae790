//! Query pipeline integration tests
//!
//! Drives `QueryDispatcher` end to end with scripted backends and a scripted
//! cross-encoder.

use async_trait::async_trait;
use ragsift::backends::{BackendError, FullTextSearchBackend, RawHit, VectorSearchBackend};
use ragsift::retrieval::{
    PipelineOptions, QueryDispatcher, RelevanceModel, RerankError, RerankOptions, Reranker,
    SearchError, SearchQuery, WeightConfigStore, WeightProfile, WeightUpdate,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Fixed hits per collection or index name, optionally after a delay
#[derive(Default)]
struct ScriptedBackend {
    hits: HashMap<String, Vec<RawHit>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    fn with(mut self, name: &str, hits: Vec<RawHit>) -> Self {
        self.hits.insert(name.to_string(), hits);
        self
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    async fn answer(&self, name: &str, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .hits
            .get(name)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl VectorSearchBackend for ScriptedBackend {
    async fn query(&self, collection: &str, _text: &str, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        self.answer(collection, limit).await
    }

    async fn add(&self, _c: &str, _id: &str, _t: &str, _m: Map<String, Value>) -> Result<(), BackendError> {
        Ok(())
    }
}

#[async_trait]
impl FullTextSearchBackend for ScriptedBackend {
    async fn query(&self, index: &str, _text: &str, limit: usize, _fuzzy: bool) -> Result<Vec<RawHit>, BackendError> {
        self.answer(index, limit).await
    }

    async fn add(&self, _i: &str, _id: &str, _t: &str, _m: Map<String, Value>) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Logit per snippet; unknown snippets score very low
struct ScriptedModel {
    logits: HashMap<String, f32>,
    delay: Option<Duration>,
}

impl RelevanceModel for ScriptedModel {
    fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(documents
            .iter()
            .map(|d| self.logits.get(d).copied().unwrap_or(-10.0))
            .collect())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn no_recency() -> WeightProfile {
    WeightProfile {
        recency_weight: 0.0,
        ..Default::default()
    }
}

fn build(
    vector: ScriptedBackend,
    fulltext: ScriptedBackend,
    profile: WeightProfile,
    reranker: Reranker,
    options: PipelineOptions,
) -> QueryDispatcher {
    QueryDispatcher::new(
        Arc::new(vector),
        Arc::new(fulltext),
        Arc::new(WeightConfigStore::new(profile).unwrap()),
        Arc::new(reranker),
        options,
    )
}

fn query(text: &str, use_reranking: bool) -> SearchQuery {
    SearchQuery {
        use_reranking,
        ..SearchQuery::new(text, 10)
    }
}

/// Distance whose normalized similarity is `similarity`
fn distance(similarity: f32) -> f32 {
    1.0 - similarity
}

/// BM25 score whose normalized relevance is `relevance` at saturation 8
fn bm25(relevance: f32) -> f32 {
    relevance * 8.0 / (1.0 - relevance)
}

#[tokio::test]
async fn same_document_from_both_backends_collapses_to_weighted_max() {
    let vector = ScriptedBackend::default().with(
        "documents",
        vec![RawHit::new("doc-42", distance(0.81), "quartz oscillator drift measurements")],
    );
    let fulltext = ScriptedBackend::default().with(
        "documents",
        vec![RawHit::new("doc-42", bm25(0.64), "quartz oscillator drift measurements")],
    );
    let profile = WeightProfile {
        vector_backend_weight: 1.1,
        fulltext_backend_weight: 1.0,
        document_collection_weight: 1.5,
        ..no_recency()
    };

    let response = build(vector, fulltext, profile, Reranker::disabled(), PipelineOptions::default())
        .search(&query("quartz oscillator drift", false))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    let top = &response.results[0];
    assert_eq!(top.candidate.doc_id(), "doc-42");
    assert!((top.score - 1.3365).abs() < 1e-5, "score was {}", top.score);
    assert_eq!(top.candidate.sources().len(), 2);
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn both_backends_timing_out_fails_the_query() {
    let options = PipelineOptions {
        backend_timeout: Duration::from_millis(20),
        query_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let slow = || ScriptedBackend::slow(Duration::from_millis(300));

    let err = build(slow(), slow(), no_recency(), Reranker::disabled(), options)
        .search(&query("anything", false))
        .await
        .unwrap_err();

    let SearchError::AllBackendsFailed { warnings } = err else {
        panic!("expected AllBackendsFailed, got {:?}", err);
    };
    assert_eq!(warnings.len(), 4);
    assert!(warnings.iter().all(|w| w.contains("timed out")));
}

fn three_documents() -> ScriptedBackend {
    ScriptedBackend::default().with(
        "documents",
        vec![
            RawHit::new("a", distance(0.9), "alpha"),
            RawHit::new("b", distance(0.8), "bravo"),
            RawHit::new("c", distance(0.7), "charlie"),
        ],
    )
}

fn ids(dispatch: &ragsift::retrieval::SearchResponse) -> Vec<&str> {
    dispatch.results.iter().map(|r| r.candidate.doc_id()).collect()
}

#[tokio::test]
async fn reranker_not_requested_keeps_composite_order() {
    let model = ScriptedModel {
        logits: HashMap::from([("charlie".to_string(), 10.0)]),
        delay: None,
    };
    let reranker = Reranker::new(Arc::new(model), RerankOptions::default());

    let response = build(
        three_documents(),
        ScriptedBackend::default(),
        no_recency(),
        reranker,
        PipelineOptions::default(),
    )
    .search(&query("x", false))
    .await
    .unwrap();

    assert_eq!(ids(&response), vec!["a", "b", "c"]);
    assert!(response.results.iter().all(|r| r.relevance.is_none()));
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn reranker_promotes_relevant_candidate() {
    let model = ScriptedModel {
        logits: HashMap::from([("charlie".to_string(), 10.0)]),
        delay: None,
    };
    let reranker = Reranker::new(Arc::new(model), RerankOptions::default());

    let response = build(
        three_documents(),
        ScriptedBackend::default(),
        no_recency(),
        reranker,
        PipelineOptions::default(),
    )
    .search(&query("x", true))
    .await
    .unwrap();

    assert_eq!(ids(&response)[0], "c");
    assert!(response.results[0].relevance.unwrap() > 0.99);
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn slow_reranker_falls_back_with_warning() {
    let model = ScriptedModel {
        logits: HashMap::from([("charlie".to_string(), 10.0)]),
        delay: Some(Duration::from_millis(300)),
    };
    let options = RerankOptions {
        timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let reranker = Reranker::new(Arc::new(model), options);

    let response = build(
        three_documents(),
        ScriptedBackend::default(),
        no_recency(),
        reranker,
        PipelineOptions::default(),
    )
    .search(&query("x", true))
    .await
    .unwrap();

    assert_eq!(ids(&response), vec!["a", "b", "c"]);
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("timed out"));
}

#[tokio::test]
async fn missing_reranker_warns_only_when_requested() {
    let dispatcher = build(
        three_documents(),
        ScriptedBackend::default(),
        no_recency(),
        Reranker::disabled(),
        PipelineOptions::default(),
    );

    let requested = dispatcher.search(&query("x", true)).await.unwrap();
    assert_eq!(ids(&requested), vec!["a", "b", "c"]);
    assert_eq!(requested.warnings.len(), 1);

    let skipped = dispatcher.search(&query("x", false)).await.unwrap();
    assert!(skipped.warnings.is_empty());
}

#[tokio::test]
async fn rejected_weight_update_leaves_profile_in_effect() {
    let dispatcher = build(
        three_documents(),
        ScriptedBackend::default(),
        no_recency(),
        Reranker::disabled(),
        PipelineOptions::default(),
    );
    let before = dispatcher.weights().get();

    let update = WeightUpdate {
        recency_decay_days: Some(-1),
        ..Default::default()
    };
    assert!(dispatcher.weights().update(&update).is_err());
    assert_eq!(*dispatcher.weights().get(), *before);

    // Queries keep running against the old profile
    let response = dispatcher.search(&query("x", false)).await.unwrap();
    assert_eq!(response.results.len(), 3);
}

#[tokio::test]
async fn chunks_of_one_document_become_one_candidate() {
    let chunk = |i: u32, similarity: f32| {
        RawHit::new(format!("long-{}", i), distance(similarity), format!("chunk {}", i))
            .with_metadata("hash", "long")
            .with_metadata("chunk_number", i)
    };
    let vector = ScriptedBackend::default().with(
        "documents",
        vec![chunk(0, 0.7), chunk(1, 0.6), chunk(2, 0.55), RawHit::new("short", distance(0.72), "short")],
    );

    let response = build(
        vector,
        ScriptedBackend::default(),
        no_recency(),
        Reranker::disabled(),
        PipelineOptions::default(),
    )
    .search(&query("x", false))
    .await
    .unwrap();

    // 0.7 * (1 + 0.05 * 2) = 0.77 beats the single 0.72 hit
    assert_eq!(ids(&response), vec!["long", "short"]);
    assert_eq!(response.results[0].candidate.matched_chunks, 3);
    assert!((response.results[0].score - 0.77).abs() < 1e-5);
}

#[tokio::test]
async fn query_deadline_cuts_off_reranking() {
    let model = ScriptedModel {
        logits: HashMap::from([("charlie".to_string(), 10.0)]),
        delay: Some(Duration::from_millis(400)),
    };
    // The reranker alone would wait ten seconds; the query deadline is much shorter
    let reranker = Reranker::new(Arc::new(model), RerankOptions::default());
    let options = PipelineOptions {
        backend_timeout: Duration::from_millis(50),
        query_timeout: Duration::from_millis(100),
        ..Default::default()
    };

    let response = build(three_documents(), ScriptedBackend::default(), no_recency(), reranker, options)
        .search(&query("x", true))
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["a", "b", "c"]);
    assert!(response.results.iter().all(|r| r.relevance.is_none()));
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("Query deadline reached"));
}

#[tokio::test]
async fn query_deadline_keeps_the_fast_backend() {
    let options = PipelineOptions {
        backend_timeout: Duration::from_millis(5_000),
        query_timeout: Duration::from_millis(80),
        ..Default::default()
    };
    let slow_fulltext = ScriptedBackend::slow(Duration::from_millis(300));

    let response = build(three_documents(), slow_fulltext, no_recency(), Reranker::disabled(), options)
        .search(&query("x", false))
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["a", "b", "c"]);
    assert_eq!(response.warnings.len(), 2);
    assert!(response
        .warnings
        .iter()
        .all(|w| w.starts_with("fulltext-") && w.contains("timed out")));
}
