use ragsift::app::Services;
use ragsift::cli::{Cli, Commands, ConfigAction, ModeArg};
use ragsift::config::Config;
use ragsift::error::{Result, SiftError};
use ragsift::ingest::{DuplicateCheck, IngestCandidate};
use ragsift::retrieval::{CollectionFilter, SearchQuery, SearchResponse};
use ragsift::server::{self, AppState, QueryDefaults, ServiceInfo};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { listen } => {
            cmd_serve(cli.config, listen)?;
        }
        Commands::Query {
            query,
            mode,
            top_k,
            fuzzy,
            no_rerank,
            collection,
            json,
        } => {
            let options = QueryFlags {
                mode,
                top_k,
                fuzzy,
                no_rerank,
                collection,
            };
            cmd_query(cli.config, &query, options, json)?;
        }
        Commands::Ingest {
            file,
            title,
            author,
            publisher,
            date,
            url,
            force,
        } => {
            let mut candidate = IngestCandidate::new(read_text(&file)?);
            candidate.title = title;
            candidate.author = author;
            candidate.publisher = publisher;
            candidate.date = date;
            candidate.url = url;
            cmd_ingest(cli.config, candidate, force)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "ragsift=debug" } else { "ragsift=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| SiftError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    Config::load_or_default(config_path.as_deref())
}

/// Build services and restore the in-memory vector collections
async fn start_services(config: &Config) -> Result<Services> {
    let services = Services::build(config)?;
    let restored = services.restore_vectors().await?;
    tracing::info!("Restored {} vector entries from the full-text indexes", restored);
    Ok(services)
}

fn cmd_serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let listen = listen.unwrap_or_else(|| config.server.listen_addr.clone());
    let addr: SocketAddr = listen.parse().map_err(|_| SiftError::InvalidConfigValue {
        path: "server.listen_addr".to_string(),
        message: format!("Not a socket address: '{}'", listen),
    })?;

    tracing::info!("Starting ragsift server...");

    runtime()?.block_on(async {
        let services = start_services(&config).await?;
        let info = ServiceInfo::new(
            services.embedding_model(),
            services.dispatcher.reranker().model_name(),
        );
        let state = AppState::new(
            services.dispatcher.clone(),
            services.detector.clone(),
            QueryDefaults::from(&config),
            info,
        );
        server::serve(addr, state).await
    })
}

/// Query options given on the command line
struct QueryFlags {
    mode: ModeArg,
    top_k: Option<usize>,
    fuzzy: Option<bool>,
    no_rerank: bool,
    collection: CollectionFilter,
}

fn cmd_query(config_path: Option<PathBuf>, text: &str, flags: QueryFlags, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let defaults = QueryDefaults::from(&config);

    let query = SearchQuery {
        text: text.to_string(),
        mode: flags.mode.into(),
        fuzzy: flags.fuzzy.unwrap_or(defaults.fuzzy),
        similarity_threshold: defaults.similarity_threshold,
        use_reranking: defaults.use_reranking && !flags.no_rerank,
        top_k: flags.top_k.unwrap_or(defaults.top_k),
        collection_filter: flags.collection,
        weights: None,
    };

    let response = runtime()?.block_on(async {
        let services = start_services(&config).await?;
        Ok::<_, SiftError>(services.dispatcher.search(&query).await?)
    })?;

    if json {
        let out = serde_json::to_string_pretty(&response).map_err(|e| SiftError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_results(&response);
    }
    Ok(())
}

fn print_results(response: &SearchResponse) {
    if response.results.is_empty() {
        println!("No results for '{}'", response.query);
    }

    for (rank, ranked) in response.results.iter().enumerate() {
        let candidate = &ranked.candidate;
        let result = &candidate.representative;
        let sources: Vec<&str> = candidate.sources().iter().map(|s| s.as_str()).collect();

        println!(
            "{:>2}. [{:.3}] {} ({}, {})",
            rank + 1,
            ranked.score,
            result.label().unwrap_or(candidate.doc_id()),
            result.doc_type,
            sources.join(" + ")
        );
        if let Some(date) = result.date {
            println!("    date: {}", date.format("%Y-%m-%d"));
        }
        if candidate.matched_chunks > 1 {
            println!("    matched chunks: {}", candidate.matched_chunks);
        }
        println!("    {}", result.preview(200).replace('\n', " "));
    }

    for warning in &response.warnings {
        println!("⚠ {}", warning);
    }
}

fn cmd_ingest(config_path: Option<PathBuf>, candidate: IngestCandidate, force: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let threshold = config.ingest.threshold_percent;

    runtime()?.block_on(async {
        let services = start_services(&config).await?;
        let detector = &services.detector;

        match detector.check(&candidate).await? {
            DuplicateCheck::Flagged { similar } => {
                println!("Similar documents found (above {:.0}%):", threshold);
                for doc in &similar {
                    println!(
                        "  {:5.1}%  {}  {}{}",
                        doc.similarity_percent,
                        doc.doc_id,
                        doc.title.as_deref().unwrap_or("(untitled)"),
                        doc.author
                            .as_deref()
                            .map(|a| format!(" by {}", a))
                            .unwrap_or_default()
                    );
                }
                if !force {
                    println!("Not ingested. Use --force to ingest anyway.");
                    return Ok(());
                }
                println!("Proceeding anyway (--force)");
            }
            DuplicateCheck::Clear { best_percent } => {
                if let Some(best) = best_percent {
                    tracing::debug!("Closest existing document is {:.1}% similar", best);
                }
            }
        }

        let (doc_id, chunks) = detector.commit(&candidate).await?;
        println!("✓ Ingested {} ({} chunks)", doc_id, chunks);
        Ok::<(), SiftError>(())
    })
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
        }
    }

    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| SiftError::Io {
        source: e,
        context: format!("Failed to read {:?}", path),
    })
}
