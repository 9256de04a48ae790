/// HNSW-backed vector search over named collections
use super::{BackendError, EmbeddingProvider, RawHit, VectorSearchBackend};
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// HNSW graph parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Connections per layer
    pub m: usize,
    /// Candidate list size while building (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
    /// Capacity hint for each collection
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_elements: 100_000,
        }
    }
}

const MAX_LAYERS: usize = 16;

struct StoredItem {
    id: String,
    text: String,
    metadata: Map<String, Value>,
}

struct Collection {
    graph: Hnsw<'static, f32, DistCosine>,
    /// Graph point id is the position in this vec
    items: Vec<StoredItem>,
    slots: HashMap<String, usize>,
}

impl Collection {
    fn new(params: &HnswParams) -> Self {
        Self {
            graph: Hnsw::<f32, DistCosine>::new(
                params.m,
                params.max_elements,
                MAX_LAYERS,
                params.ef_construction,
                DistCosine,
            ),
            items: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

type Collections = Arc<RwLock<HashMap<String, Collection>>>;

/// In-process vector backend
///
/// Scores returned from `query` are cosine distances, closest first.
pub struct HnswVectorBackend {
    provider: Arc<dyn EmbeddingProvider>,
    params: HnswParams,
    collections: Collections,
}

impl HnswVectorBackend {
    pub fn new<I, S>(provider: Arc<dyn EmbeddingProvider>, params: HnswParams, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections = collections
            .into_iter()
            .map(|name| (name.into(), Collection::new(&params)))
            .collect();

        Self {
            provider,
            params,
            collections: Arc::new(RwLock::new(collections)),
        }
    }

    /// Number of stored items in a collection
    pub fn len(&self, collection: &str) -> Result<usize, BackendError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        guard
            .get(collection)
            .map(|c| c.items.len())
            .ok_or_else(|| BackendError::UnknownCollection(collection.to_string()))
    }

    pub fn embedding_model(&self) -> &str {
        self.provider.model_name()
    }

    fn ensure_collection(&self, collection: &str) -> Result<(), BackendError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        if guard.contains_key(collection) {
            Ok(())
        } else {
            Err(BackendError::UnknownCollection(collection.to_string()))
        }
    }
}

fn poisoned() -> BackendError {
    BackendError::Index("vector collection lock poisoned".to_string())
}

fn join_error(e: tokio::task::JoinError) -> BackendError {
    BackendError::Unavailable(format!("vector task failed: {}", e))
}

#[async_trait]
impl VectorSearchBackend for HnswVectorBackend {
    async fn query(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<RawHit>, BackendError> {
        self.ensure_collection(collection)?;
        let limit = limit.min(self.len(collection)?);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let provider = Arc::clone(&self.provider);
        let collections = Arc::clone(&self.collections);
        let collection = collection.to_string();
        let text = text.to_string();
        let ef_search = self.params.ef_search.max(limit);

        tokio::task::spawn_blocking(move || {
            let vector = provider.embed(&text)?;

            let guard = collections.read().map_err(|_| poisoned())?;
            let coll = guard
                .get(&collection)
                .ok_or_else(|| BackendError::UnknownCollection(collection.clone()))?;

            let mut neighbours = coll.graph.search(&vector, limit, ef_search);
            neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));

            let hits = neighbours
                .into_iter()
                .filter_map(|n| {
                    coll.items.get(n.d_id).map(|item| RawHit {
                        id: item.id.clone(),
                        score: n.distance,
                        text: item.text.clone(),
                        metadata: item.metadata.clone(),
                    })
                })
                .collect();

            Ok(hits)
        })
        .await
        .map_err(join_error)?
    }

    async fn add(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), BackendError> {
        self.ensure_collection(collection)?;

        let provider = Arc::clone(&self.provider);
        let collections = Arc::clone(&self.collections);
        let collection = collection.to_string();
        let id = id.to_string();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let vector = provider.embed(&text)?;

            let mut guard = collections.write().map_err(|_| poisoned())?;
            let coll = guard
                .get_mut(&collection)
                .ok_or_else(|| BackendError::UnknownCollection(collection.clone()))?;

            // Ids are content-derived, so an existing slot already holds this vector
            if let Some(&slot) = coll.slots.get(&id) {
                coll.items[slot].metadata = metadata;
                tracing::debug!("Vector item {} already in {}, metadata refreshed", id, collection);
                return Ok(());
            }

            let slot = coll.items.len();
            coll.graph.insert((vector.as_slice(), slot));
            coll.slots.insert(id.clone(), slot);
            coll.items.push(StoredItem { id, text, metadata });

            Ok(())
        })
        .await
        .map_err(join_error)?
    }
}
