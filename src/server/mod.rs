//! HTTP API
//!
//! ## Endpoints
//!
//! - `GET /api/info`: service and model descriptor
//! - `POST /api/query`: ranked results with `content`
//! - `POST /api/rag`: the same results with `text` and the score inside `metadata`
//! - `GET /config/weights`, `POST /config/weights`: read or update the weight profile
//! - `POST /api/ingest/check`: duplicate check, then commit or park
//! - `GET /api/ingest/pending`: parked candidates
//! - `POST /api/ingest/{pending_id}/proceed`, `POST /api/ingest/{pending_id}/cancel`

use crate::config::Config;
use crate::error::{Result, SiftError, ValidationError};
use crate::ingest::{DuplicateDetector, DuplicateError, IngestCandidate};
use crate::retrieval::{
    CollectionFilter, QueryDispatcher, RankedCandidate, SearchError, SearchMode, SearchQuery,
    WeightError, WeightUpdate,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

type ApiResponse = (StatusCode, Json<Value>);

/// Query fields a request may omit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryDefaults {
    pub top_k: usize,
    pub fuzzy: bool,
    pub similarity_threshold: f64,
    pub use_reranking: bool,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            top_k: 10,
            fuzzy: true,
            similarity_threshold: 0.5,
            use_reranking: true,
        }
    }
}

impl From<&Config> for QueryDefaults {
    /// Reranking defaults to off when the reranker is disabled in config
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.default_top_k,
            fuzzy: config.retrieval.default_fuzzy,
            similarity_threshold: config.retrieval.default_similarity_threshold,
            use_reranking: config.reranker.enabled,
        }
    }
}

/// Payload of `GET /api/info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub models: ModelInfo,
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub embedding: String,
    pub reranking: Option<String>,
}

impl ServiceInfo {
    pub fn new(embedding_model: &str, reranking_model: Option<&str>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            models: ModelInfo {
                embedding: embedding_model.to_string(),
                reranking: reranking_model.map(str::to_string),
            },
            collections: vec!["emails".to_string(), "documents".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<QueryDispatcher>,
    detector: Arc<DuplicateDetector>,
    defaults: QueryDefaults,
    info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<QueryDispatcher>,
        detector: Arc<DuplicateDetector>,
        defaults: QueryDefaults,
        info: ServiceInfo,
    ) -> Self {
        Self {
            dispatcher,
            detector,
            defaults,
            info: Arc::new(info),
        }
    }
}

/// Body of `/api/query` and `/api/rag`
///
/// `weights` is kept as raw JSON so a bad override can be reported per field.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub mode: Option<SearchMode>,
    #[serde(default)]
    pub fuzzy: Option<bool>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub use_reranking: Option<bool>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub collection_filter: Option<CollectionFilter>,
    #[serde(default)]
    pub weights: Option<Value>,
}

impl QueryRequest {
    pub fn into_query(self, defaults: &QueryDefaults) -> std::result::Result<SearchQuery, Vec<ValidationError>> {
        let weights = match self.weights {
            Some(value) if !value.is_null() => Some(WeightUpdate::from_json(&value)?),
            _ => None,
        };

        Ok(SearchQuery {
            text: self.query,
            mode: self.mode.unwrap_or_default(),
            fuzzy: self.fuzzy.unwrap_or(defaults.fuzzy),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            use_reranking: self.use_reranking.unwrap_or(defaults.use_reranking),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            collection_filter: self.collection_filter.unwrap_or_default(),
            weights,
        })
    }
}

/// Build the router over shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(handle_info))
        .route("/api/query", post(handle_query))
        .route("/api/rag", post(handle_rag))
        .route("/config/weights", get(handle_get_weights).post(handle_update_weights))
        .route("/api/ingest/check", post(handle_ingest_check))
        .route("/api/ingest/pending", get(handle_pending))
        .route("/api/ingest/{pending_id}/proceed", post(handle_proceed))
        .route("/api/ingest/{pending_id}/cancel", post(handle_cancel))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| SiftError::Io {
        source: e,
        context: format!("Failed to bind {}", addr),
    })?;
    let local = listener.local_addr().map_err(|e| SiftError::Io {
        source: e,
        context: "Failed to read local address".to_string(),
    })?;
    tracing::info!("Listening on http://{}", local);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SiftError::Server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// Result shaping

/// Flat metadata for one ranked result
fn result_metadata(ranked: &RankedCandidate) -> Map<String, Value> {
    let candidate = &ranked.candidate;
    let r = &candidate.representative;
    let mut metadata = Map::new();

    metadata.insert("doc_type".to_string(), json!(r.doc_type));
    metadata.insert("source".to_string(), json!(r.source));

    let optional = [
        ("title", r.title.clone()),
        ("date", r.date.map(|d| d.to_rfc3339())),
        ("url", r.url.clone()),
        ("from", r.from_field.clone()),
        ("subject", r.subject.clone()),
        ("author", r.author.clone()),
        ("publisher", r.publisher.clone()),
        ("publisher_id", r.publisher_id.clone()),
        ("chunk_id", r.chunk_id.clone()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            metadata.insert(key.to_string(), Value::from(value));
        }
    }
    if let Some(index) = r.chunk_index {
        metadata.insert("chunk_index".to_string(), Value::from(index));
    }
    if let Some(total) = r.total_chunks {
        metadata.insert("total_chunks".to_string(), Value::from(total));
    }
    for (key, value) in &r.additional_metadata {
        metadata.entry(key.clone()).or_insert_with(|| value.clone());
    }

    metadata.insert("composite_score".to_string(), json!(candidate.composite));
    if let Some(relevance) = ranked.relevance {
        metadata.insert("rerank_score".to_string(), json!(relevance));
    }
    metadata.insert("matched_chunks".to_string(), json!(candidate.matched_chunks));
    metadata.insert("sources".to_string(), json!(candidate.sources()));
    metadata
}

fn query_view(ranked: &RankedCandidate) -> Value {
    json!({
        "id": ranked.candidate.doc_id(),
        "content": ranked.candidate.representative.snippet,
        "score": ranked.score,
        "metadata": result_metadata(ranked),
    })
}

fn rag_view(ranked: &RankedCandidate) -> Value {
    let mut metadata = result_metadata(ranked);
    metadata.insert("score".to_string(), json!(ranked.score));
    json!({
        "id": ranked.candidate.doc_id(),
        "text": ranked.candidate.representative.snippet,
        "metadata": metadata,
    })
}

fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "error": message.to_string() }))
}

fn invalid_weights(error: &str, fields: Vec<ValidationError>) -> ApiResponse {
    tracing::warn!("{}: {:?}", error, fields);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": error,
            "fields": fields,
        })),
    )
}

// Handlers

async fn handle_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.info.as_ref().clone())
}

async fn handle_query(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResponse {
    run_query(&state, body, query_view).await
}

async fn handle_rag(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResponse {
    run_query(&state, body, rag_view).await
}

async fn run_query(state: &AppState, body: Value, view: fn(&RankedCandidate) -> Value) -> ApiResponse {
    let request: QueryRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_body(format!("Invalid query request: {}", e)),
            )
        }
    };
    let query = match request.into_query(&state.defaults) {
        Ok(query) => query,
        Err(fields) => return invalid_weights("Invalid weight override", fields),
    };

    match state.dispatcher.search(&query).await {
        Ok(response) => {
            let results: Vec<Value> = response.results.iter().map(view).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "query": response.query,
                    "results": results,
                    "warnings": response.warnings,
                    "weights": response.weights,
                })),
            )
        }
        Err(SearchError::InvalidQuery(message)) => (StatusCode::BAD_REQUEST, error_body(message)),
        Err(SearchError::InvalidWeights(fields)) => invalid_weights("Invalid weight override", fields),
        Err(SearchError::AllBackendsFailed { warnings }) => {
            tracing::error!("Query '{}' failed, no backend answered: {}", query.text, warnings.join("; "));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "query": query.text,
                    "results": [],
                    "warnings": warnings,
                    "error": "No search backend is available",
                })),
            )
        }
    }
}

async fn handle_get_weights(State(state): State<AppState>) -> ApiResponse {
    let profile = state.dispatcher.weights().get();
    (StatusCode::OK, Json(json!(&*profile)))
}

/// Fields are checked one by one so unknown or mistyped ones come back named
async fn handle_update_weights(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResponse {
    let update = match WeightUpdate::from_json(&body) {
        Ok(update) => update,
        Err(fields) => return invalid_weights("Invalid weight profile", fields),
    };

    match state.dispatcher.weights().update(&update) {
        Ok(profile) => (StatusCode::OK, Json(json!(&*profile))),
        Err(WeightError::Invalid(fields)) => invalid_weights("Invalid weight profile", fields),
    }
}

fn ingest_error(e: DuplicateError) -> ApiResponse {
    match e {
        DuplicateError::EmptyDocument => (StatusCode::BAD_REQUEST, error_body(e)),
        DuplicateError::UnknownPending(_) => (StatusCode::NOT_FOUND, error_body(e)),
        DuplicateError::Backend(_) => {
            tracing::error!("Ingestion failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, error_body(e))
        }
    }
}

async fn handle_ingest_check(
    State(state): State<AppState>,
    Json(candidate): Json<IngestCandidate>,
) -> ApiResponse {
    match state.detector.submit(candidate).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => ingest_error(e),
    }
}

async fn handle_pending(State(state): State<AppState>) -> ApiResponse {
    (StatusCode::OK, Json(json!(state.detector.pending().list())))
}

async fn handle_proceed(State(state): State<AppState>, Path(pending_id): Path<Uuid>) -> ApiResponse {
    match state.detector.proceed(pending_id).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => ingest_error(e),
    }
}

async fn handle_cancel(State(state): State<AppState>, Path(pending_id): Path<Uuid>) -> ApiResponse {
    match state.detector.cancel(pending_id) {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "cancelled", "pending_id": pending_id })),
        ),
        Err(e) => ingest_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, FullTextSearchBackend, RawHit, VectorSearchBackend};
    use crate::retrieval::{CorpusNames, PipelineOptions, Reranker, WeightConfigStore, WeightProfile};
    use crate::ingest::IngestOptions;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::result::Result;

    /// Serves canned hits per collection name and accepts every add
    #[derive(Default)]
    struct Canned {
        hits: Vec<(String, RawHit)>,
        down: bool,
        added: Mutex<Vec<String>>,
    }

    impl Canned {
        fn hits_for(&self, name: &str, limit: usize) -> Result<Vec<RawHit>, BackendError> {
            if self.down {
                return Err(BackendError::Unavailable("connection refused".to_string()));
            }
            Ok(self
                .hits
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, h)| h.clone())
                .take(limit)
                .collect())
        }
    }

    #[async_trait]
    impl VectorSearchBackend for Canned {
        async fn query(&self, c: &str, _t: &str, limit: usize) -> Result<Vec<RawHit>, BackendError> {
            self.hits_for(c, limit)
        }

        async fn add(&self, _c: &str, id: &str, _t: &str, _m: Map<String, Value>) -> Result<(), BackendError> {
            self.added.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl FullTextSearchBackend for Canned {
        async fn query(&self, i: &str, _t: &str, limit: usize, _f: bool) -> Result<Vec<RawHit>, BackendError> {
            self.hits_for(i, limit)
        }

        async fn add(&self, _i: &str, id: &str, _t: &str, _m: Map<String, Value>) -> Result<(), BackendError> {
            self.added.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn state_with(vector: Canned, fulltext: Canned) -> AppState {
        let vector: Arc<Canned> = Arc::new(vector);
        let fulltext: Arc<Canned> = Arc::new(fulltext);
        let weights = Arc::new(WeightConfigStore::new(WeightProfile::default()).unwrap());

        let dispatcher = QueryDispatcher::new(
            vector.clone(),
            fulltext.clone(),
            weights,
            Arc::new(Reranker::disabled()),
            PipelineOptions::default(),
        );
        let detector = DuplicateDetector::new(vector, fulltext, CorpusNames::default(), IngestOptions::default());
        AppState::new(
            Arc::new(dispatcher),
            Arc::new(detector),
            QueryDefaults::default(),
            ServiceInfo::new("all-MiniLM-L6-v2", None),
        )
    }

    fn document_state() -> AppState {
        let hit = RawHit::new("abc-0", 0.1, "quartz oscillator drift")
            .with_metadata("hash", "abc")
            .with_metadata("title", "Oscillators")
            .with_metadata("chunk_number", 0);
        let vector = Canned {
            hits: vec![("documents".to_string(), hit)],
            ..Default::default()
        };
        state_with(vector, Canned::default())
    }

    fn request(body: Value) -> Json<Value> {
        Json(body)
    }

    #[tokio::test]
    async fn query_shapes_results_with_content() {
        let state = document_state();
        let (status, Json(body)) =
            handle_query(State(state), request(json!({"query": "oscillator", "use_reranking": false}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "oscillator");
        let first = &body["results"][0];
        assert_eq!(first["id"], "abc");
        assert_eq!(first["content"], "quartz oscillator drift");
        assert_eq!(first["metadata"]["title"], "Oscillators");
        assert_eq!(first["metadata"]["doc_type"], "document");
        assert_eq!(first["metadata"]["sources"][0], "vector-document");
        assert!(first["metadata"].get("rerank_score").is_none());
        assert_eq!(body["warnings"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn rag_nests_score_in_metadata() {
        let state = document_state();
        let (status, Json(body)) =
            handle_rag(State(state), request(json!({"query": "oscillator", "use_reranking": false}))).await;

        assert_eq!(status, StatusCode::OK);
        let first = &body["results"][0];
        assert_eq!(first["text"], "quartz oscillator drift");
        assert!(first.get("content").is_none());
        assert!(first.get("score").is_none());
        assert!(first["metadata"]["score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let (status, _) = handle_query(State(document_state()), request(json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn all_backends_down_is_unavailable() {
        let down = || Canned {
            down: true,
            ..Default::default()
        };
        let state = state_with(down(), down());

        let (status, Json(body)) = handle_query(State(state), request(json!({"query": "anything"}))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["warnings"].as_array().unwrap().len(), 4);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn invalid_weight_update_is_rejected_and_old_profile_kept() {
        let state = document_state();

        let (status, Json(body)) =
            handle_update_weights(State(state.clone()), Json(json!({"recency_decay_days": -1}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "recency_decay_days");

        let (_, Json(current)) = handle_get_weights(State(state.clone())).await;
        assert_eq!(current["recency_decay_days"], 365);

        let (status, Json(body)) =
            handle_update_weights(State(state), Json(json!({"vector_backend_weight": 1.1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vector_backend_weight"], 1.1);
        assert_eq!(body["recency_decay_days"], 365);
    }

    #[tokio::test]
    async fn unknown_weight_field_is_named_in_rejection() {
        let state = document_state();
        let (status, Json(body)) = handle_update_weights(
            State(state.clone()),
            Json(json!({"chromadb_weight": 1.0, "reranker_weight": 0.5})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Invalid weight profile");
        assert_eq!(body["fields"].as_array().unwrap().len(), 1);
        assert_eq!(body["fields"][0]["field"], "chromadb_weight");
        assert!(body["fields"][0]["message"].as_str().unwrap().contains("unknown field"));

        // Nothing from the rejected body was applied
        let (_, Json(current)) = handle_get_weights(State(state)).await;
        assert_eq!(current["reranker_weight"], 0.7);
    }

    #[tokio::test]
    async fn mistyped_weight_field_is_named_in_rejection() {
        for bad in [json!("abc"), json!(30.0)] {
            let (status, Json(body)) = handle_update_weights(
                State(document_state()),
                Json(json!({"recency_decay_days": bad})),
            )
            .await;

            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["fields"][0]["field"], "recency_decay_days");
            assert!(body["fields"][0]["message"].as_str().unwrap().contains("integer"));
        }
    }

    #[tokio::test]
    async fn oversized_top_k_is_bad_request() {
        for top_k in [json!(1e12), json!(1_000_000_000_000u64)] {
            let (status, Json(body)) =
                handle_query(State(document_state()), request(json!({"query": "oscillator", "top_k": top_k}))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn weight_override_changes_one_query_only() {
        let state = document_state();
        let body = json!({
            "query": "oscillator",
            "use_reranking": false,
            "weights": {"document_collection_weight": 2.0},
        });

        let (status, Json(boosted)) = handle_query(State(state.clone()), request(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(boosted["weights"]["document_collection_weight"], 2.0);

        let (_, Json(plain)) =
            handle_query(State(state.clone()), request(json!({"query": "oscillator", "use_reranking": false}))).await;
        let boosted_score = boosted["results"][0]["score"].as_f64().unwrap();
        let plain_score = plain["results"][0]["score"].as_f64().unwrap();
        assert!((boosted_score - 2.0 * plain_score).abs() < 1e-9);

        let (_, Json(current)) = handle_get_weights(State(state)).await;
        assert_eq!(current["document_collection_weight"], 1.0);
    }

    #[tokio::test]
    async fn invalid_weight_override_is_unprocessable() {
        let body = json!({"query": "oscillator", "weights": {"reranker_weight": 3.0, "typo_weight": 1}});
        let (status, Json(body)) = handle_query(State(document_state()), request(body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "typo_weight");

        let body = json!({"query": "oscillator", "weights": {"reranker_weight": 3.0}});
        let (status, Json(body)) = handle_query(State(document_state()), request(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "reranker_weight");
    }

    #[tokio::test]
    async fn collection_filter_limits_results() {
        let state = document_state();
        let body = json!({"query": "oscillator", "use_reranking": false, "collection_filter": "emails"});
        let (status, Json(body)) = handle_query(State(state.clone()), request(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], json!([]));

        let body = json!({"query": "oscillator", "collection_filter": "web"});
        let (status, _) = handle_query(State(state), request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn flagged_ingest_can_be_cancelled_once() {
        // Distance 0.05 is 95% similar
        let hit = RawHit::new("old-0", 0.05, "existing text").with_metadata("hash", "old");
        let vector = Canned {
            hits: vec![("documents".to_string(), hit)],
            ..Default::default()
        };
        let state = state_with(vector, Canned::default());

        let candidate = IngestCandidate::new("nearly the same text");
        let (status, Json(body)) = handle_ingest_check(State(state.clone()), Json(candidate)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "flagged");
        assert_eq!(body["similar"][0]["doc_id"], "old");

        let pending_id: Uuid = serde_json::from_value(body["pending_id"].clone()).unwrap();
        let (_, Json(listed)) = handle_pending(State(state.clone())).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, Json(body)) = handle_cancel(State(state.clone()), Path(pending_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");

        let (status, _) = handle_proceed(State(state), Path(pending_id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn info_lists_models_and_collections() {
        let Json(info) = handle_info(State(document_state())).await;
        assert_eq!(info.name, "ragsift");
        assert_eq!(info.models.embedding, "all-MiniLM-L6-v2");
        assert_eq!(info.models.reranking, None);
        assert_eq!(info.collections, vec!["emails", "documents"]);
    }

    #[test]
    fn disabled_reranker_turns_off_default_reranking() {
        let mut config = Config::default();
        config.reranker.enabled = false;
        config.retrieval.default_top_k = 4;

        let defaults = QueryDefaults::from(&config);
        assert!(!defaults.use_reranking);
        assert_eq!(defaults.top_k, 4);
    }

    #[test]
    fn request_defaults_fill_missing_fields() {
        let defaults = QueryDefaults {
            top_k: 7,
            fuzzy: false,
            similarity_threshold: 0.3,
            use_reranking: true,
        };
        let request: QueryRequest = serde_json::from_value(json!({"query": "q", "mode": "vector"})).unwrap();
        let query = request.into_query(&defaults).unwrap();

        assert_eq!(query.mode, SearchMode::Vector);
        assert_eq!(query.top_k, 7);
        assert!(!query.fuzzy);
        assert_eq!(query.similarity_threshold, 0.3);
        assert!(query.use_reranking);
        assert_eq!(query.collection_filter, CollectionFilter::All);
        assert!(query.weights.is_none());
    }
}
