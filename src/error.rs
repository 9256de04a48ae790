use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ragsift
#[derive(Error, Debug)]
pub enum SiftError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Retrieval backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] crate::backends::BackendError),

    /// Query pipeline errors
    #[error("Search error: {0}")]
    Search(#[from] crate::retrieval::SearchError),

    /// Ingestion errors
    #[error("Ingestion error: {0}")]
    Ingest(#[from] crate::ingest::DuplicateError),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Field-level validation error, shared by config loading and weight updates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Path to the key that failed validation
    #[serde(rename = "field")]
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result type for ragsift operations
pub type Result<T> = std::result::Result<T, SiftError>;
