/// Tantivy full-text indexes with BM25 ranking
use super::{BackendError, FullTextSearchBackend, RawHit};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value as _, STORED, STRING, TEXT};
use tantivy::{
    doc, DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One corpus worth of full-text index
pub struct TextIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    doc_id_field: Field,
    content_field: Field,
    metadata_field: Field,
}

impl TextIndex {
    /// Open the index stored in `path`, creating it if the directory holds none
    pub fn open_or_create(path: &Path) -> Result<Self, BackendError> {
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path).map_err(index_error)?
        } else {
            std::fs::create_dir_all(path)?;
            Index::create_in_dir(path, Self::schema()).map_err(index_error)?
        };
        Self::from_index(index)
    }

    /// RAM-only index, lost on drop
    pub fn in_memory() -> Result<Self, BackendError> {
        Self::from_index(Index::create_in_ram(Self::schema()))
    }

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field("doc_id", STRING | STORED);
        builder.add_text_field("content", TEXT | STORED);
        builder.add_text_field("metadata", STORED);
        builder.build()
    }

    fn from_index(index: Index) -> Result<Self, BackendError> {
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| BackendError::Index(format!("Missing '{}' field in schema", name)))
        };
        let doc_id_field = field("doc_id")?;
        let content_field = field("content")?;
        let metadata_field = field("metadata")?;

        let writer = index.writer(WRITER_HEAP_BYTES).map_err(index_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(index_error)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            doc_id_field,
            content_field,
            metadata_field,
        })
    }

    /// Insert or replace the document with this id and commit
    pub fn add(&self, id: &str, text: &str, metadata: &Map<String, Value>) -> Result<(), BackendError> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| BackendError::Index(format!("metadata not serializable: {}", e)))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BackendError::Index("index writer lock poisoned".to_string()))?;

        writer.delete_term(Term::from_field_text(self.doc_id_field, id));
        writer
            .add_document(doc!(
                self.doc_id_field => id,
                self.content_field => text,
                self.metadata_field => metadata_json,
            ))
            .map_err(index_error)?;
        writer.commit().map_err(index_error)?;

        self.reader.reload().map_err(index_error)?;
        Ok(())
    }

    /// Ranked search over the content field
    ///
    /// With `fuzzy`, each query term matches anything within one edit.
    pub fn search(&self, text: &str, limit: usize, fuzzy: bool) -> Result<Vec<RawHit>, BackendError> {
        if limit == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query: Box<dyn Query> = if fuzzy {
            let clauses: Vec<(Occur, Box<dyn Query>)> = query_terms(text)
                .into_iter()
                .map(|term| {
                    let term = Term::from_field_text(self.content_field, &term);
                    (Occur::Should, Box::new(FuzzyTermQuery::new(term, 1, true)) as Box<dyn Query>)
                })
                .collect();
            if clauses.is_empty() {
                return Ok(Vec::new());
            }
            Box::new(BooleanQuery::new(clauses))
        } else {
            QueryParser::for_index(&self.index, vec![self.content_field])
                .parse_query(text)
                .map_err(|e| BackendError::Query(e.to_string()))?
        };

        // TopDocs allocates its heap up front, so never ask for more than exist
        let searcher = self.reader.searcher();
        let limit = limit.min(usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(Vec::new());
        }
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| BackendError::Query(e.to_string()))?;

        top_docs
            .into_iter()
            .map(|(score, address)| self.stored_hit(&searcher, address, score))
            .collect()
    }

    /// Every live document, in index order, with a zero score
    pub fn documents(&self) -> Result<Vec<RawHit>, BackendError> {
        let searcher = self.reader.searcher();
        let mut hits = Vec::new();
        for (ordinal, segment) in searcher.segment_readers().iter().enumerate() {
            for doc in segment.doc_ids_alive() {
                let address = DocAddress::new(ordinal as u32, doc);
                hits.push(self.stored_hit(&searcher, address, 0.0)?);
            }
        }
        Ok(hits)
    }

    fn stored_hit(&self, searcher: &Searcher, address: DocAddress, score: f32) -> Result<RawHit, BackendError> {
        let stored: TantivyDocument = searcher.doc(address).map_err(index_error)?;

        let text_of = |field: Field| {
            stored
                .get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let id = text_of(self.doc_id_field);
        let metadata = match serde_json::from_str::<Map<String, Value>>(&text_of(self.metadata_field)) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Stored metadata for {} is not a JSON object: {}", id, e);
                Map::new()
            }
        };

        Ok(RawHit {
            id,
            score,
            text: text_of(self.content_field),
            metadata,
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// Split the way the default tokenizer does: alphanumeric runs, lowercased
fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn index_error(e: tantivy::TantivyError) -> BackendError {
    BackendError::Index(e.to_string())
}

/// Full-text backend holding one `TextIndex` per named corpus
#[derive(Default)]
pub struct TantivyTextBackend {
    indexes: HashMap<String, Arc<TextIndex>>,
}

impl TantivyTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, name: impl Into<String>, index: TextIndex) -> Self {
        self.indexes.insert(name.into(), Arc::new(index));
        self
    }

    /// Names of the configured indexes
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.keys().cloned().collect();
        names.sort();
        names
    }

    /// All stored documents of one index
    pub async fn documents(&self, name: &str) -> Result<Vec<RawHit>, BackendError> {
        let index = self.index(name)?;
        tokio::task::spawn_blocking(move || index.documents())
            .await
            .map_err(join_error)?
    }

    fn index(&self, name: &str) -> Result<Arc<TextIndex>, BackendError> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::UnknownCollection(name.to_string()))
    }
}

fn join_error(e: tokio::task::JoinError) -> BackendError {
    BackendError::Unavailable(format!("full-text task failed: {}", e))
}

#[async_trait]
impl FullTextSearchBackend for TantivyTextBackend {
    async fn query(
        &self,
        index: &str,
        text: &str,
        limit: usize,
        fuzzy: bool,
    ) -> Result<Vec<RawHit>, BackendError> {
        let index = self.index(index)?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || index.search(&text, limit, fuzzy))
            .await
            .map_err(join_error)?
    }

    async fn add(
        &self,
        index: &str,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), BackendError> {
        let index = self.index(index)?;
        let id = id.to_string();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || index.add(&id, &text, &metadata))
            .await
            .map_err(join_error)?
    }
}
