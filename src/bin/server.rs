//! HTTP server binary entry point.
//!
//! Loads the embedding model once, opens the paper catalog and serves
//! `GET /search` until interrupted.
//!
//! # Examples
//!
//! ```bash
//! server --db-path papers.db --port 8000
//! ARXIV_GRAPH_DB=papers.db RUST_LOG=arxiv_graph_search=debug server
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arxiv_graph_search::{
    embedding::{
        fastembed::{parse_model, FastEmbedProvider},
        EmbeddingProvider,
    },
    graph::DEFAULT_NEIGHBORS,
    query::{GraphSearchEngine, SearchOptions, DEFAULT_RESULT_LIMIT},
    server::{self, AppState, ServerConfig},
    storage::sqlite::SqliteStore,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Graph search HTTP server
#[derive(Parser, Debug)]
#[command(name = "server", version, about = "Serve semantic paper search with result similarity graphs")]
struct Args {
    /// Paper catalog (SQLite file)
    #[arg(long, env = "ARXIV_GRAPH_DB", value_name = "PATH")]
    db_path: PathBuf,

    /// Address to bind
    #[arg(long, env = "ARXIV_GRAPH_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "ARXIV_GRAPH_PORT", default_value_t = 8000)]
    port: u16,

    /// Embedding model; must match the model the catalog was embedded with
    #[arg(long, env = "ARXIV_GRAPH_MODEL", default_value = "BGEBaseENV15")]
    model: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Papers retrieved per query
    #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT)]
    result_limit: usize,

    /// Graph neighbors per paper
    #[arg(long, default_value_t = DEFAULT_NEIGHBORS)]
    neighbors: usize,

    /// Logging verbosity level
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let store = SqliteStore::open(&args.db_path)
        .with_context(|| format!("Failed to open catalog {}", args.db_path.display()))?;
    let paper_count = store
        .count_papers()
        .with_context(|| "Failed to count papers in catalog")?;
    info!("Catalog contains {} searchable papers", paper_count);

    let model = parse_model(&args.model)?;
    let provider = tokio::task::spawn_blocking(move || FastEmbedProvider::new(Some(model), args.cache_dir))
        .await
        .context("Model loading task failed")?
        .with_context(|| "Failed to load embedding model")?;
    info!(
        "Embedding model {} loaded (dimension: {})",
        provider.model_name(),
        provider.dimension()
    );

    let options = SearchOptions {
        result_limit: args.result_limit,
        neighbors: args.neighbors,
        ..SearchOptions::default()
    };
    let engine = GraphSearchEngine::new(provider, store, options);
    let state = AppState::new(Arc::new(engine));

    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };
    server::run(&config, state).await?;

    Ok(())
}
