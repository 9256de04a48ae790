//! CLI command definitions and parsing
use crate::retrieval::{CollectionFilter, SearchMode};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragsift",
    version,
    about = "Hybrid vector + full-text retrieval with weighted merging and reranking",
    long_about = "ragsift queries email and document corpora through a vector index and a full-text \
                  index at once, merges the hits into one weighted ranking, collapses chunks of the \
                  same document, optionally reranks with a cross-encoder, and flags near-duplicate \
                  documents before ingestion."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragsift/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides server.listen_addr)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Run one query against the local indexes
    Query {
        /// Search query text
        query: String,

        /// Which backends to query
        #[arg(short, long, value_enum, default_value_t = ModeArg::Combined)]
        mode: ModeArg,

        /// Maximum number of results (defaults to retrieval.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Tolerate one edit per term in full-text matching
        #[arg(long)]
        fuzzy: Option<bool>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Corpora to search: all, emails, documents, or a comma-separated list
        #[arg(long, default_value = "all")]
        collection: CollectionFilter,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check a document for near-duplicates and ingest it
    Ingest {
        /// Text file to ingest
        file: PathBuf,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        publisher: Option<String>,

        /// Publication date
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Commit even when similar documents exist
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default configuration path
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Combined,
    Vector,
    Fulltext,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Combined => SearchMode::Combined,
            ModeArg::Vector => SearchMode::Vector,
            ModeArg::Fulltext => SearchMode::Fulltext,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
