//! arXiv Graph Search - semantic search over research papers that returns a
//! similarity graph of the results.
//!
//! Given free text, the system retrieves the papers closest to it and links
//! every result to its most similar fellow results, so clients can render
//! the answer as a graph rather than a flat list.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, ResultItem, SimilarityEdge, SearchResponse)
//! - **embedding**: Query embedding generation (fastembed)
//! - **storage**: Nearest-neighbor retrieval (SQLite-based catalog)
//! - **graph**: Pairwise similarity matrix and k-nearest-neighbor edge selection
//! - **query**: Search orchestration and error taxonomy
//! - **server**: HTTP API (axum)
//!
//! # Workflow
//!
//! 1. Receive search query over HTTP or from the CLI
//! 2. Embed the query text
//! 3. Retrieve the nearest papers with their stored embeddings
//! 4. Score each paper's relevance as `1 - distance`
//! 5. Link each paper to its 5 most similar results
//! 6. Return `{query, nodes, links}`
//!
//! # Example
//!
//! ```ignore
//! use arxiv_graph_search::{
//!     embedding::fastembed::FastEmbedProvider,
//!     storage::sqlite::SqliteStore,
//!     query::{GraphSearchEngine, SearchEngine, SearchOptions},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = FastEmbedProvider::new(None, None)?;
//!     let store = SqliteStore::open("papers.db")?;
//!     let engine = GraphSearchEngine::new(provider, store, SearchOptions::default());
//!
//!     let response = engine.search("diffusion models").await?;
//!     for node in &response.nodes {
//!         println!("{}: {:.3}", node.title, node.relevance);
//!     }
//!     Ok(())
//! }
//! ```

pub mod embedding;
pub mod graph;
pub mod models;
pub mod query;
pub mod server;
pub mod storage;

// Re-export commonly used types at the crate root
pub use embedding::EmbeddingProvider;
pub use graph::{SelfExclusion, SimilarityGraphBuilder};
pub use models::{GraphNode, Paper, RelevanceLevel, ResultItem, SearchResponse, SimilarityEdge};
pub use query::{GraphSearchEngine, QueryError, SearchEngine, SearchOptions};
pub use storage::{DistanceMetric, NearestNeighborStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
