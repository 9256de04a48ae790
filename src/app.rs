//! Wiring from a loaded `Config` to the running pipeline

use crate::backends::{
    BackendError, EmbeddingProvider, FastEmbedProvider, FullTextSearchBackend, HnswVectorBackend,
    TantivyTextBackend, TextIndex, VectorSearchBackend,
};
use crate::config::Config;
use crate::error::{Result, SiftError};
use crate::ingest::DuplicateDetector;
use crate::retrieval::{
    CorpusNames, FastEmbedRelevanceModel, QueryDispatcher, Reranker, WeightConfigStore,
};
use std::sync::Arc;

/// The query dispatcher and duplicate detector over one shared set of backends
pub struct Services {
    pub dispatcher: Arc<QueryDispatcher>,
    pub detector: Arc<DuplicateDetector>,
    vector: Arc<HnswVectorBackend>,
    fulltext: Arc<TantivyTextBackend>,
    corpora: CorpusNames,
    embedding_model: String,
}

impl Services {
    /// Load models and open indexes
    ///
    /// Model loading may download weights on first use. A reranker that
    /// fails to load is logged and replaced by composite-only ordering.
    pub fn build(config: &Config) -> Result<Self> {
        let provider = FastEmbedProvider::new(&config.embedding.model).map_err(BackendError::from)?;
        if provider.dimension() != config.backends.vector_dim {
            tracing::warn!(
                "Embedding model {} produces {}D vectors but backends.vector_dim is {}",
                config.embedding.model,
                provider.dimension(),
                config.backends.vector_dim
            );
        }

        let corpora = config.corpus_names();
        let vector = Arc::new(HnswVectorBackend::new(
            Arc::new(provider),
            config.hnsw_params(),
            [
                corpora.email_collection.clone(),
                corpora.document_collection.clone(),
            ],
        ));

        let email_dir = config.email_index_path()?;
        let document_dir = config.document_index_path()?;
        tracing::info!("Opening full-text indexes in {:?} and {:?}", email_dir, document_dir);
        let fulltext = Arc::new(
            TantivyTextBackend::new()
                .with_index(corpora.email_index.clone(), TextIndex::open_or_create(&email_dir)?)
                .with_index(
                    corpora.document_index.clone(),
                    TextIndex::open_or_create(&document_dir)?,
                ),
        );

        let reranker = if config.reranker.enabled {
            match FastEmbedRelevanceModel::new(&config.reranker.model) {
                Ok(model) => Reranker::new(Arc::new(model), config.rerank_options()),
                Err(e) => {
                    tracing::warn!("Reranker unavailable, ordering by composite score: {}", e);
                    Reranker::disabled()
                }
            }
        } else {
            tracing::info!("Reranking disabled by configuration");
            Reranker::disabled()
        };

        let weights = WeightConfigStore::new(config.weights.clone())
            .map_err(|e| SiftError::Config(e.to_string()))?;

        Ok(Self::assemble(
            vector,
            fulltext,
            Arc::new(weights),
            Arc::new(reranker),
            config,
        ))
    }

    fn assemble(
        vector: Arc<HnswVectorBackend>,
        fulltext: Arc<TantivyTextBackend>,
        weights: Arc<WeightConfigStore>,
        reranker: Arc<Reranker>,
        config: &Config,
    ) -> Self {
        let corpora = config.corpus_names();
        let vector_dyn: Arc<dyn VectorSearchBackend> = vector.clone();
        let fulltext_dyn: Arc<dyn FullTextSearchBackend> = fulltext.clone();

        let dispatcher = QueryDispatcher::new(
            Arc::clone(&vector_dyn),
            Arc::clone(&fulltext_dyn),
            weights,
            reranker,
            config.pipeline_options(),
        );
        let detector = DuplicateDetector::new(
            vector_dyn,
            fulltext_dyn,
            corpora.clone(),
            config.ingest_options(),
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            detector: Arc::new(detector),
            embedding_model: vector.embedding_model().to_string(),
            vector,
            fulltext,
            corpora,
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Re-embed every stored full-text document into its vector collection
    ///
    /// The HNSW graphs are not persisted, so this runs once at startup.
    /// Returns the number of entries restored.
    pub async fn restore_vectors(&self) -> Result<usize> {
        let pairs = [
            (&self.corpora.email_index, &self.corpora.email_collection),
            (&self.corpora.document_index, &self.corpora.document_collection),
        ];

        let mut restored = 0;
        for (index, collection) in pairs {
            let documents = self.fulltext.documents(index).await?;
            tracing::info!("Restoring {} entries into vector collection '{}'", documents.len(), collection);
            for hit in documents {
                self.vector.add(collection, &hit.id, &hit.text, hit.metadata).await?;
                restored += 1;
            }
        }
        Ok(restored)
    }
}
