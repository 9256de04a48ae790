use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{Result, SiftError, ValidationError};
use std::net::SocketAddr;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every failing field at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_backends(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_reranker(config, &mut errors);
        errors.extend(config.weights.validate_at("weights"));
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SiftError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        let addr = &config.server.listen_addr;
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.listen_addr",
                format!("Not a socket address: '{}'", addr),
            ));
        }
    }

    fn validate_backends(config: &Config, errors: &mut Vec<ValidationError>) {
        let b = &config.backends;

        if b.email_collection.trim().is_empty() {
            errors.push(ValidationError::new(
                "backends.email_collection",
                "Collection name cannot be empty",
            ));
        }
        if b.document_collection.trim().is_empty() {
            errors.push(ValidationError::new(
                "backends.document_collection",
                "Collection name cannot be empty",
            ));
        }
        if b.email_collection == b.document_collection {
            errors.push(ValidationError::new(
                "backends.document_collection",
                "Email and document collections must differ",
            ));
        }
        if b.email_index_dir == b.document_index_dir {
            errors.push(ValidationError::new(
                "backends.document_index_dir",
                "Email and document indexes must use different directories",
            ));
        }

        for (path, value) in [
            ("backends.vector_dim", b.vector_dim),
            ("backends.hnsw_m", b.hnsw_m),
            ("backends.hnsw_ef_construction", b.hnsw_ef_construction),
            ("backends.hnsw_ef_search", b.hnsw_ef_search),
            ("backends.hnsw_max_elements", b.hnsw_max_elements),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;

        if r.default_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                "Must be greater than 0",
            ));
        }
        if r.max_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_top_k",
                "Must be greater than 0",
            ));
        } else if r.default_top_k > r.max_top_k {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                format!("Must not exceed retrieval.max_top_k ({})", r.max_top_k),
            ));
        }
        if r.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&r.default_similarity_threshold) {
            errors.push(ValidationError::new(
                "retrieval.default_similarity_threshold",
                format!(
                    "Must be between 0.0 and 1.0, got {}",
                    r.default_similarity_threshold
                ),
            ));
        }
        if !(r.bm25_saturation.is_finite() && r.bm25_saturation > 0.0) {
            errors.push(ValidationError::new(
                "retrieval.bm25_saturation",
                format!("Must be a positive number, got {}", r.bm25_saturation),
            ));
        }
        if r.snippet_chars == 0 {
            errors.push(ValidationError::new(
                "retrieval.snippet_chars",
                "Must be greater than 0",
            ));
        }
        for (path, value) in [
            ("retrieval.chunk_bonus", r.chunk_bonus),
            ("retrieval.chunk_bonus_cap", r.chunk_bonus_cap),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ValidationError::new(
                    path,
                    format!("Must be >= 0, got {}", value),
                ));
            }
        }
        if r.backend_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.backend_timeout_ms",
                "Must be greater than 0",
            ));
        }
        if r.query_timeout_ms < r.backend_timeout_ms {
            errors.push(ValidationError::new(
                "retrieval.query_timeout_ms",
                format!(
                    "Must be at least backend_timeout_ms ({}), got {}",
                    r.backend_timeout_ms, r.query_timeout_ms
                ),
            ));
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.reranker;

        if r.enabled && r.model.is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty when reranking is enabled",
            ));
        }
        if r.candidates_limit == 0 {
            errors.push(ValidationError::new(
                "reranker.candidates_limit",
                "Must be greater than 0",
            ));
        }
        if r.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "reranker.timeout_ms",
                "Must be greater than 0",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        let i = &config.ingest;

        if !(i.threshold_percent > 0.0 && i.threshold_percent <= 100.0) {
            errors.push(ValidationError::new(
                "ingest.threshold_percent",
                format!("Must be within (0, 100], got {}", i.threshold_percent),
            ));
        }
        for (path, value) in [
            ("ingest.neighbours", i.neighbours),
            ("ingest.excerpt_chars", i.excerpt_chars),
            ("ingest.chunk_chars", i.chunk_chars),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_of(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Ok(()) => Vec::new(),
            Err(SiftError::ConfigValidation { errors }) => errors.into_iter().map(|e| e.path).collect(),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_bad_listen_addr() {
        let mut config = Config::default();
        config.server.listen_addr = "localhost".to_string();
        assert_eq!(errors_of(&config), vec!["server.listen_addr"]);
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = Config::default();
        config.meta.schema_version = "0.9".to_string();
        config.retrieval.default_similarity_threshold = 2.0;
        config.reranker.candidates_limit = 0;
        config.weights.reranker_weight = -1.0;
        config.ingest.threshold_percent = 0.0;

        assert_eq!(
            errors_of(&config),
            vec![
                "_meta.schema_version",
                "retrieval.default_similarity_threshold",
                "reranker.candidates_limit",
                "weights.reranker_weight",
                "ingest.threshold_percent",
            ]
        );
    }

    #[test]
    fn test_query_timeout_covers_backend_timeout() {
        let mut config = Config::default();
        config.retrieval.backend_timeout_ms = 20_000;
        config.retrieval.query_timeout_ms = 10_000;
        assert_eq!(errors_of(&config), vec!["retrieval.query_timeout_ms"]);
    }

    #[test]
    fn test_default_top_k_within_max() {
        let mut config = Config::default();
        config.retrieval.max_top_k = 5;
        assert_eq!(errors_of(&config), vec!["retrieval.default_top_k"]);

        config.retrieval.max_top_k = 0;
        assert_eq!(errors_of(&config), vec!["retrieval.max_top_k"]);
    }

    #[test]
    fn test_collections_must_differ() {
        let mut config = Config::default();
        config.backends.email_collection = "documents".to_string();
        assert_eq!(errors_of(&config), vec!["backends.document_collection"]);
    }
}
