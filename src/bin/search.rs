//! Search binary entry point.
//!
//! This binary provides a command-line interface for running graph searches
//! against a local paper catalog. It supports both single-query and interactive
//! REPL modes, with table or JSON output.
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --db-path papers.db --query "neural networks"
//! ```
//!
//! JSON output (same body as the HTTP endpoint):
//! ```bash
//! search --db-path papers.db --query "transformers" --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --db-path papers.db --interactive
//! ```

use anyhow::{Context, Result};
use arxiv_graph_search::{
    embedding::fastembed::{parse_model, FastEmbedProvider},
    graph::DEFAULT_NEIGHBORS,
    models::{GraphNode, RelevanceLevel, SearchResponse},
    query::{GraphSearchEngine, SearchEngine, SearchOptions, DEFAULT_RESULT_LIMIT},
    storage::sqlite::SqliteStore,
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// The JSON body the HTTP endpoint returns
    Json,
}

/// Search binary CLI for querying the paper catalog
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search papers and show how the results relate to each other",
    long_about = "Query the paper catalog using semantic search. Each result is linked to \
                  its most similar fellow results.

EXAMPLES:
  Single query:
    search --db-path papers.db --query \"neural networks\"

  JSON output:
    search --db-path papers.db --query \"transformers\" --format json

  Interactive mode:
    search --db-path papers.db --interactive"
)]
struct Args {
    /// Paper catalog (SQLite file)
    #[arg(long, env = "ARXIV_GRAPH_DB", value_name = "PATH")]
    db_path: PathBuf,

    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Papers retrieved per query
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RESULT_LIMIT)]
    result_limit: usize,

    /// Graph neighbors per paper
    #[arg(long, value_name = "K", default_value_t = DEFAULT_NEIGHBORS)]
    neighbors: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Embedding model; must match the model the catalog was embedded with
    #[arg(long, env = "ARXIV_GRAPH_MODEL", default_value = "BGEBaseENV15")]
    model: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Format results as a pretty table
fn format_results_table(response: &SearchResponse) -> String {
    if response.nodes.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Updated").add_attribute(Attribute::Bold),
        Cell::new("Community").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, node) in response.nodes.iter().enumerate() {
        let level = RelevanceLevel::from_score(node.relevance);
        let color = match level {
            RelevanceLevel::Identical => Color::Green,
            RelevanceLevel::HighlySimilar => Color::Cyan,
            RelevanceLevel::Similar => Color::Yellow,
            RelevanceLevel::Relevant => Color::White,
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&node.title, 60)),
            Cell::new(truncate(node.authors.as_deref().unwrap_or("-"), 40)),
            Cell::new(node.update_date.map_or("-".to_string(), |d| d.to_string())),
            Cell::new(node.community_id.as_deref().unwrap_or("-")),
            Cell::new(level.label()).fg(color),
            Cell::new(format!("{:.4}", node.relevance)),
        ]);
    }

    table.to_string()
}

/// Format results as JSON
fn format_results_json(response: &SearchResponse) -> Result<String> {
    serde_json::to_string_pretty(response).with_context(|| "Failed to serialize results to JSON")
}

fn print_response(response: &SearchResponse, format: OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(response));
            println!(
                "\nFound {} papers and {} links in {:.2}s",
                response.nodes.len(),
                response.links.len(),
                elapsed_secs
            );
        }
        OutputFormat::Json => println!("{}", format_results_json(response)?),
    }
    Ok(())
}

/// Display detailed view of a single node and its graph neighbors
fn display_node_detail(response: &SearchResponse, node: &GraphNode, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", node.title);
    if let Some(arxiv_id) = &node.arxiv_id {
        println!("arXiv: {}", arxiv_id);
    }
    println!("Authors: {}", node.authors.as_deref().unwrap_or("-"));
    println!("Categories: {}", node.categories.as_deref().unwrap_or("-"));
    if let Some(date) = node.update_date {
        println!("Updated: {}", date);
    }
    if let Some(journal_ref) = &node.journal_ref {
        println!("Journal: {}", journal_ref);
    }
    if let Some(citations) = node.citation_count {
        println!("Citations: {}", citations);
    }
    println!("Relevance: {:.4}", node.relevance);

    println!("\nMost similar results:");
    for edge in response.neighbors_of(&node.id) {
        let title = response
            .nodes
            .iter()
            .find(|candidate| candidate.id == edge.target)
            .map_or("?", |candidate| candidate.title.as_str());
        println!("  {:.4}  {}", edge.weight, truncate(title, 70));
    }

    println!("\nAbstract:\n{}", node.abstract_text.as_deref().unwrap_or("(none)"));
    println!("{}", "═".repeat(80));
}

fn print_help() {
    println!("Commands:");
    println!("  <query>         - Search for papers");
    println!("  /format table   - Use table output format");
    println!("  /format json    - Use JSON output format");
    println!("  /detail N       - Show details and graph neighbors for result rank N");
    println!("  /help           - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive REPL mode
async fn run_interactive<E: SearchEngine>(engine: E, mut format: OutputFormat) -> Result<()> {
    println!("Interactive Paper Graph Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_response: Option<SearchResponse> = None;

    loop {
        match rl.readline("Search> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_help(),
                        "/format" => match parts.get(1).copied() {
                            Some("table") => {
                                format = OutputFormat::Table;
                                println!("Set output format to table");
                            }
                            Some("json") => {
                                format = OutputFormat::Json;
                                println!("Set output format to JSON");
                            }
                            _ => eprintln!("Usage: /format [table|json]"),
                        },
                        "/detail" => {
                            let Some(response) = &last_response else {
                                eprintln!("No search results yet");
                                continue;
                            };
                            match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
                                Some(rank) if rank > 0 && rank <= response.nodes.len() => {
                                    display_node_detail(response, &response.nodes[rank - 1], rank);
                                }
                                Some(rank) if rank > response.nodes.len() => {
                                    eprintln!(
                                        "Rank {} out of range (last search had {} results)",
                                        rank,
                                        response.nodes.len()
                                    );
                                }
                                _ => eprintln!("Usage: /detail N (N a positive integer)"),
                            }
                        }
                        other => eprintln!("Unknown command: {}. Type /help for available commands.", other),
                    }
                    continue;
                }

                let start = Instant::now();
                match engine.search(line).await {
                    Ok(response) => {
                        if let Err(e) = print_response(&response, format, start.elapsed().as_secs_f64()) {
                            eprintln!("Error formatting results: {}", e);
                        }
                        last_response = Some(response);
                    }
                    Err(e) => eprintln!("Search failed: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query<E: SearchEngine>(engine: E, query: &str, format: OutputFormat) -> Result<()> {
    debug!("Executing search for query: {}", query);
    let start = Instant::now();
    let response = engine
        .search(query)
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query))?;
    print_response(&response, format, start.elapsed().as_secs_f64())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let query = match (&args.query, args.interactive) {
        (Some(query), false) => Some(query.clone()),
        (None, true) => None,
        _ => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };

    info!("Loading catalog from: {}", args.db_path.display());
    let store = SqliteStore::open(&args.db_path)
        .with_context(|| format!("Failed to open catalog {}", args.db_path.display()))?;

    let paper_count = store
        .count_papers()
        .with_context(|| "Failed to count papers in catalog")?;
    if paper_count == 0 {
        anyhow::bail!("Catalog is empty (0 papers with embeddings found).");
    }
    info!("Catalog contains {} papers", paper_count);

    let model = parse_model(&args.model)?;
    let provider = FastEmbedProvider::new(Some(model), args.cache_dir)
        .with_context(|| "Failed to create FastEmbed provider")?;
    info!("Embedding provider initialized successfully");

    let options = SearchOptions {
        result_limit: args.result_limit,
        neighbors: args.neighbors,
        ..SearchOptions::default()
    };
    let engine = GraphSearchEngine::new(provider, store, options);

    match query {
        Some(query) => run_single_query(engine, &query, args.format).await,
        None => run_interactive(engine, args.format).await,
    }
}
