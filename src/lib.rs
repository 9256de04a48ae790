//! ragsift - hybrid retrieval merge-and-rerank engine
//!
//! Queries a vector index and a full-text index over email and document
//! corpora concurrently, normalizes and weights every hit, collapses chunks
//! of the same document into one candidate, optionally reranks with a
//! cross-encoder, and screens new documents for near-duplicates.

pub mod app;
pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod server;

pub use error::{Result, SiftError};
