//! Configuration management for ragsift
//!
//! A single TOML file, overridable per key from `RAGSIFT_SECTION__KEY`
//! environment variables and validated as a whole before use.

use crate::backends::HnswParams;
use crate::error::{Result, SiftError};
use crate::ingest::IngestOptions;
use crate::retrieval::{
    AggregationOptions, CorpusNames, NormalizeOptions, PipelineOptions, RerankOptions,
    WeightProfile, DEFAULT_MAX_TOP_K,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub server: ServerConfig,
    pub backends: BackendsConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub reranker: RerankerConfig,
    /// Initial weight profile; replaced at runtime through `/config/weights`
    pub weights: WeightProfile,
    pub ingest: IngestConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8100".to_string(),
        }
    }
}

/// Local vector collections and full-text indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Root for relative index directories; a leading `~` is expanded
    pub data_dir: PathBuf,
    pub email_collection: String,
    pub document_collection: String,
    pub email_index_dir: PathBuf,
    pub document_index_dir: PathBuf,
    pub vector_dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_max_elements: usize,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.ragsift"),
            email_collection: "emails".to_string(),
            document_collection: "documents".to_string(),
            email_index_dir: PathBuf::from("index/emails"),
            document_index_dir: PathBuf::from("index/documents"),
            vector_dim: 384,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
            hnsw_max_elements: 100_000,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Query pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Largest `top_k` a query may ask for
    pub max_top_k: usize,
    pub default_fuzzy: bool,
    pub default_similarity_threshold: f64,
    /// Per-source fetch limit is `top_k * search_multiplier`
    pub search_multiplier: usize,
    pub bm25_saturation: f64,
    pub snippet_chars: usize,
    pub chunk_bonus: f64,
    pub chunk_bonus_cap: f64,
    pub backend_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_top_k: DEFAULT_MAX_TOP_K,
            default_fuzzy: true,
            default_similarity_threshold: 0.5,
            search_multiplier: 2,
            bm25_saturation: 8.0,
            snippet_chars: 500,
            chunk_bonus: 0.05,
            chunk_bonus_cap: 0.25,
            backend_timeout_ms: 5_000,
            query_timeout_ms: 15_000,
        }
    }
}

/// Cross-encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model: String,
    pub candidates_limit: usize,
    pub timeout_ms: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "BAAI/bge-reranker-base".to_string(),
            candidates_limit: 50,
            timeout_ms: 10_000,
        }
    }
}

/// Document ingestion and duplicate review
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub threshold_percent: f64,
    pub neighbours: usize,
    pub excerpt_chars: usize,
    pub chunk_chars: usize,
    pub pending_max_age_hours: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let defaults = IngestOptions::default();
        Self {
            threshold_percent: defaults.threshold_percent,
            neighbours: defaults.neighbours,
            excerpt_chars: defaults.excerpt_chars,
            chunk_chars: defaults.chunk_chars,
            pending_max_age_hours: defaults.pending_max_age_hours,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            server: ServerConfig::default(),
            backends: BackendsConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            reranker: RerankerConfig::default(),
            weights: WeightProfile::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SiftError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SiftError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` if given, else from the default location, else built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path()?;
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", default_path);
            let mut config = Self::default();
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiftError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SiftError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGSIFT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAGSIFT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let invalid = |kind: &str| SiftError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as {}", value, kind),
        };

        match path {
            "SERVER__LISTEN_ADDR" => {
                self.server.listen_addr = value.to_string();
            }
            "BACKENDS__DATA_DIR" => {
                self.backends.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "RERANKER__ENABLED" => {
                self.reranker.enabled = value.parse().map_err(|_| invalid("boolean"))?;
            }
            "RERANKER__MODEL" => {
                self.reranker.model = value.to_string();
            }
            "INGEST__THRESHOLD_PERCENT" => {
                self.ingest.threshold_percent = value.parse().map_err(|_| invalid("number"))?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SiftError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragsift").join("config.toml"))
    }

    /// Data directory with a leading `~` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_home(&self.backends.data_dir)
    }

    /// Full-text index directory for emails, resolved against the data directory
    pub fn email_index_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.backends.email_index_dir))
    }

    /// Full-text index directory for documents, resolved against the data directory
    pub fn document_index_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.backends.document_index_dir))
    }

    pub fn corpus_names(&self) -> CorpusNames {
        CorpusNames {
            email_collection: self.backends.email_collection.clone(),
            document_collection: self.backends.document_collection.clone(),
            email_index: self.backends.email_collection.clone(),
            document_index: self.backends.document_collection.clone(),
        }
    }

    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.backends.hnsw_m,
            ef_construction: self.backends.hnsw_ef_construction,
            ef_search: self.backends.hnsw_ef_search,
            max_elements: self.backends.hnsw_max_elements,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let r = &self.retrieval;
        PipelineOptions {
            corpora: self.corpus_names(),
            search_multiplier: r.search_multiplier,
            max_top_k: r.max_top_k,
            normalize: NormalizeOptions {
                bm25_saturation: r.bm25_saturation,
                snippet_chars: r.snippet_chars,
            },
            aggregation: AggregationOptions {
                chunk_bonus: r.chunk_bonus,
                chunk_bonus_cap: r.chunk_bonus_cap,
            },
            backend_timeout: Duration::from_millis(r.backend_timeout_ms),
            query_timeout: Duration::from_millis(r.query_timeout_ms),
        }
    }

    pub fn rerank_options(&self) -> RerankOptions {
        RerankOptions {
            candidates_limit: self.reranker.candidates_limit,
            timeout: Duration::from_millis(self.reranker.timeout_ms),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            threshold_percent: self.ingest.threshold_percent,
            neighbours: self.ingest.neighbours,
            excerpt_chars: self.ingest.excerpt_chars,
            chunk_chars: self.ingest.chunk_chars,
            pending_max_age_hours: self.ingest.pending_max_age_hours,
        }
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SiftError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_preserves_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.weights.vector_backend_weight = 1.1;
        config.retrieval.default_top_k = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.weights.vector_backend_weight, 1.1);
        assert_eq!(loaded.retrieval.default_top_k, 7);
        assert_eq!(loaded.server.listen_addr, "127.0.0.1:8100");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[weights]\nrecency_decay_days = 30\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.weights.recency_decay_days, 30);
        assert_eq!(config.weights.reranker_weight, 0.7);
        assert_eq!(config.ingest.threshold_percent, 85.0);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/ragsift.toml")).unwrap_err();
        assert!(matches!(err, SiftError::ConfigNotFound { .. }));
    }

    #[test]
    fn invalid_weights_fail_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[weights]\nrecency_decay_days = -1\n").unwrap();

        let Err(SiftError::ConfigValidation { errors }) = Config::load(&path) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors[0].path, "weights.recency_decay_days");
    }

    #[test]
    fn env_values_are_parsed() {
        let mut config = Config::default();
        config.set_value_from_env("RERANKER__ENABLED", "false").unwrap();
        config.set_value_from_env("INGEST__THRESHOLD_PERCENT", "90").unwrap();
        config.set_value_from_env("SERVER__LISTEN_ADDR", "0.0.0.0:9000").unwrap();

        assert!(!config.reranker.enabled);
        assert_eq!(config.ingest.threshold_percent, 90.0);
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert!(config.set_value_from_env("RERANKER__ENABLED", "maybe").is_err());
    }

    #[test]
    fn index_paths_resolve_under_data_dir() {
        let mut config = Config::default();
        config.backends.data_dir = PathBuf::from("/srv/ragsift");
        assert_eq!(
            config.document_index_path().unwrap(),
            PathBuf::from("/srv/ragsift/index/documents")
        );

        config.backends.data_dir = PathBuf::from("~/.ragsift");
        assert!(!config.data_dir().unwrap().starts_with("~"));
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.retrieval.backend_timeout_ms = 250;
        config.reranker.candidates_limit = 20;

        assert_eq!(config.pipeline_options().backend_timeout, Duration::from_millis(250));
        assert_eq!(config.rerank_options().candidates_limit, 20);
        assert_eq!(config.corpus_names().document_index, "documents");
    }
}
