//! Query orchestration module.
//!
//! This module turns a free-text query into a graph search response. It
//! coordinates the embedding provider, the nearest-neighbor store and the
//! similarity graph builder:
//!
//! 1. Validate and embed the query text
//! 2. Retrieve the nearest papers together with their stored embeddings
//! 3. Convert each distance into a relevance score (`1 - distance`)
//! 4. Build the k-nearest-neighbor graph among the results
//! 5. Assemble `{query, nodes, links}`
//!
//! # Usage
//!
//! ```rust,no_run
//! use arxiv_graph_search::embedding::fastembed::FastEmbedProvider;
//! use arxiv_graph_search::query::{GraphSearchEngine, SearchEngine, SearchOptions};
//! use arxiv_graph_search::storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FastEmbedProvider::new(None, None)?;
//! let store = SqliteStore::open("papers.db")?;
//! let engine = GraphSearchEngine::new(provider, store, SearchOptions::default());
//!
//! let response = engine.search("graph neural networks").await?;
//! println!("{} nodes, {} links", response.nodes.len(), response.links.len());
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::graph::{GraphError, SelfExclusion, SimilarityGraphBuilder, DEFAULT_NEIGHBORS};
use crate::models::{GraphNode, SearchResponse};
use crate::storage::{DistanceMetric, NearestNeighborStore, StorageError};

/// Number of papers retrieved per query unless configured otherwise.
pub const DEFAULT_RESULT_LIMIT: usize = 100;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query text is empty
    #[error("Invalid query: {0}")]
    InvalidInput(String),

    /// The embedding model or the store failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A retrieved paper's embedding is unusable
    #[error("Malformed stored vector: {0}")]
    MalformedStoredVector(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

impl From<EmbeddingError> for QueryError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput(msg) => QueryError::InvalidInput(msg),
            other => QueryError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::MalformedVector { .. } => QueryError::MalformedStoredVector(err.to_string()),
            _ => QueryError::UpstreamUnavailable(err.to_string()),
        }
    }
}

impl From<GraphError> for QueryError {
    fn from(err: GraphError) -> Self {
        QueryError::MalformedStoredVector(err.to_string())
    }
}

/// Tunables of a graph search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Number of papers retrieved from the store (N)
    pub result_limit: usize,

    /// Neighbors per node in the similarity graph (k)
    pub neighbors: usize,

    /// Metric the store ranks by; relevance assumes cosine distance
    pub metric: DistanceMetric,

    /// How a node's own entry is removed from its ranking
    pub self_exclusion: SelfExclusion,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            result_limit: DEFAULT_RESULT_LIMIT,
            neighbors: DEFAULT_NEIGHBORS,
            metric: DistanceMetric::Cosine,
            self_exclusion: SelfExclusion::DropHighest,
        }
    }
}

/// Trait for graph search engines.
///
/// The HTTP layer and the CLI only depend on this trait.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a query and return the result nodes with their similarity graph.
    ///
    /// # Errors
    /// Returns `QueryError` if the query is empty or any stage fails
    async fn search(&self, query: &str) -> QueryResult<SearchResponse>;
}

/// Default search engine: embed, retrieve, then link the results.
pub struct GraphSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: NearestNeighborStore,
{
    /// Embedding provider for the query
    embedding_provider: E,

    /// Store the neighbors are retrieved from
    store: S,

    options: SearchOptions,
    graph_builder: SimilarityGraphBuilder,
}

impl<E, S> GraphSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: NearestNeighborStore,
{
    /// Create a new engine.
    ///
    /// # Arguments
    /// * `embedding_provider` - Provider for generating query embeddings
    /// * `store` - Store for retrieving the nearest papers
    /// * `options` - Result limit, neighbor count, metric and self-exclusion policy
    pub fn new(embedding_provider: E, store: S, options: SearchOptions) -> Self {
        let graph_builder = SimilarityGraphBuilder::new()
            .with_neighbors(options.neighbors)
            .with_self_exclusion(options.self_exclusion);
        Self {
            embedding_provider,
            store,
            options,
            graph_builder,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }
}

#[async_trait]
impl<E, S> SearchEngine for GraphSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: NearestNeighborStore,
{
    async fn search(&self, query: &str) -> QueryResult<SearchResponse> {
        if query.is_empty() {
            return Err(QueryError::InvalidInput("query must not be empty".to_string()));
        }
        info!(query = %query, "Graph search started");
        let started = Instant::now();

        let query_embedding = self.embedding_provider.embed(query).await?;
        debug!(dimension = query_embedding.len(), "Query embedded");

        let items = self
            .store
            .nearest_neighbors(&query_embedding, self.options.result_limit, self.options.metric)
            .await?;
        debug!(results = items.len(), "Nearest neighbors retrieved");

        let ids: Vec<String> = items.iter().map(|item| item.node_id()).collect();
        let vectors: Vec<Vec<f32>> = items.iter().map(|item| item.embedding.clone()).collect();
        let links = self.graph_builder.build(&vectors, &ids)?;

        let nodes: Vec<GraphNode> = items
            .into_iter()
            .map(|item| {
                let relevance = 1.0 - item.distance;
                GraphNode::from_item(item, relevance)
            })
            .collect();

        info!(
            nodes = nodes.len(),
            links = links.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Graph search finished"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            nodes,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Paper, ResultItem};
    use crate::storage::StorageResult;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // Mock EmbeddingProvider that returns a fixed vector and counts calls
    struct MockEmbeddingProvider {
        vector: Vec<f32>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
                should_fail: false,
            }
        }

        fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new(vec![1.0, 0.0])
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            if self.should_fail {
                return Err(EmbeddingError::InferenceError("Mock embedding failure".to_string()));
            }
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    enum StoreBehaviour {
        Items(Vec<ResultItem>),
        Unavailable,
        Malformed,
    }

    // Mock NearestNeighborStore returning canned items
    struct MockStore {
        behaviour: StoreBehaviour,
        calls: Arc<AtomicUsize>,
        last_limit: Arc<AtomicUsize>,
    }

    impl MockStore {
        fn new(items: Vec<ResultItem>) -> Self {
            Self::with_behaviour(StoreBehaviour::Items(items))
        }

        fn with_behaviour(behaviour: StoreBehaviour) -> Self {
            Self {
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
                last_limit: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl NearestNeighborStore for MockStore {
        async fn nearest_neighbors(
            &self,
            _query: &[f32],
            limit: usize,
            _metric: DistanceMetric,
        ) -> StorageResult<Vec<ResultItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_limit.store(limit, Ordering::SeqCst);
            match &self.behaviour {
                StoreBehaviour::Items(items) => Ok(items.iter().take(limit).cloned().collect()),
                StoreBehaviour::Unavailable => {
                    Err(StorageError::ConnectionError("Mock store offline".to_string()))
                }
                StoreBehaviour::Malformed => Err(StorageError::MalformedVector {
                    id: 9,
                    reason: "expected a bracketed list".to_string(),
                }),
            }
        }
    }

    fn create_test_item(id: i64, distance: f32, embedding: Vec<f32>) -> ResultItem {
        ResultItem {
            paper: Paper {
                id,
                arxiv_id: Some(format!("2301.{:05}", id)),
                title: format!("Paper {}", id),
                abstract_text: Some("Test abstract".to_string()),
                categories: Some("cs.AI".to_string()),
                update_date: None,
                doi: None,
                authors: Some("Test Author".to_string()),
                comments: None,
                journal_ref: None,
                citation_count: None,
            },
            distance,
            community_id: if id % 2 == 0 { Some(format!("c{}", id)) } else { None },
            embedding,
        }
    }

    fn ring_items(n: usize) -> Vec<ResultItem> {
        (0..n)
            .map(|i| {
                let angle = i as f32 * 0.3;
                create_test_item(i as i64 + 1, i as f32 * 0.01, vec![angle.cos(), angle.sin()])
            })
            .collect()
    }

    #[test]
    fn test_search_options_defaults() {
        let options = SearchOptions::default();
        assert_eq!(options.result_limit, 100);
        assert_eq!(options.neighbors, 5);
        assert_eq!(options.metric, DistanceMetric::Cosine);
        assert_eq!(options.self_exclusion, SelfExclusion::DropHighest);
    }

    #[tokio::test]
    async fn test_search_assembles_nodes_and_links() {
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(ring_items(8)),
            SearchOptions::default(),
        );

        let response = engine.search("graph neural networks").await.unwrap();

        assert_eq!(response.query, "graph neural networks");
        assert_eq!(response.nodes.len(), 8);
        assert_eq!(response.links.len(), 8 * 5);

        let ids: Vec<&str> = response.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6", "7", "8"]);
        for link in &response.links {
            assert!(ids.contains(&link.source.as_str()));
            assert!(ids.contains(&link.target.as_str()));
            assert_ne!(link.source, link.target);
        }

        assert_eq!(response.nodes[1].community_id.as_deref(), Some("c2"));
        assert_eq!(response.nodes[0].community_id, None);
    }

    #[tokio::test]
    async fn test_relevance_is_one_minus_distance() {
        let items = vec![
            create_test_item(1, 0.0, vec![1.0, 0.0]),
            create_test_item(2, 0.4, vec![0.6, 0.8]),
            create_test_item(3, 1.5, vec![-0.6, -0.8]),
        ];
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(items),
            SearchOptions::default(),
        );

        let response = engine.search("test").await.unwrap();
        assert_abs_diff_eq!(response.nodes[0].relevance, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(response.nodes[1].relevance, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(response.nodes[2].relevance, -0.5, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_link_weights_follow_stored_vectors() {
        let items = vec![
            create_test_item(1, 0.0, vec![1.0, 0.0]),
            create_test_item(2, 0.1, vec![0.6, 0.8]),
        ];
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(items),
            SearchOptions::default(),
        );

        let response = engine.search("test").await.unwrap();
        assert_eq!(response.links.len(), 2);
        assert_eq!(response.links[0].source, "1");
        assert_eq!(response.links[0].target, "2");
        assert_abs_diff_eq!(response.links[0].weight, 0.6, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_empty_query_fails_before_external_calls() {
        let provider = MockEmbeddingProvider::new(vec![1.0, 0.0]);
        let store = MockStore::new(ring_items(3));
        let embed_calls = Arc::clone(&provider.calls);
        let store_calls = Arc::clone(&store.calls);
        let engine = GraphSearchEngine::new(provider, store, SearchOptions::default());

        let result = engine.search("").await;
        assert!(matches!(result, Err(QueryError::InvalidInput(_))));
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_text_is_embedded_verbatim() {
        let provider = MockEmbeddingProvider::new(vec![1.0, 0.0]);
        let seen = Arc::clone(&provider.seen);
        let engine = GraphSearchEngine::new(provider, MockStore::new(ring_items(3)), SearchOptions::default());

        for query in ["   ", "\n\t", "  graph \n neural   nets "] {
            let response = engine.search(query).await.unwrap();
            assert_eq!(response.query, query);
            assert_eq!(response.nodes.len(), 3);
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["   ", "\n\t", "  graph \n neural   nets "]
        );
    }

    #[tokio::test]
    async fn test_one_call_per_collaborator() {
        let provider = MockEmbeddingProvider::new(vec![1.0, 0.0]);
        let store = MockStore::new(ring_items(3));
        let embed_calls = Arc::clone(&provider.calls);
        let store_calls = Arc::clone(&store.calls);
        let last_limit = Arc::clone(&store.last_limit);
        let options = SearchOptions {
            result_limit: 42,
            ..SearchOptions::default()
        };
        let engine = GraphSearchEngine::new(provider, store, options);

        engine.search("test").await.unwrap();
        assert_eq!(embed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store_calls.load(Ordering::SeqCst), 1);
        assert_eq!(last_limit.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_response() {
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(Vec::new()),
            SearchOptions::default(),
        );

        let response = engine.search("nothing matches").await.unwrap();
        assert!(response.nodes.is_empty());
        assert!(response.links.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["nodes"], serde_json::json!([]));
        assert_eq!(json["links"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_short_result_set() {
        for n in 1..=6 {
            let engine = GraphSearchEngine::new(
                MockEmbeddingProvider::new(vec![1.0, 0.0]),
                MockStore::new(ring_items(n)),
                SearchOptions::default(),
            );
            let response = engine.search("short").await.unwrap();
            assert_eq!(response.nodes.len(), n);
            assert_eq!(response.links.len(), n * (n - 1).min(5));
        }
    }

    #[tokio::test]
    async fn test_embedding_error_propagation() {
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::with_failure(),
            MockStore::new(ring_items(3)),
            SearchOptions::default(),
        );

        let result = engine.search("test").await;
        assert!(matches!(result, Err(QueryError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_storage_error_propagation() {
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::with_behaviour(StoreBehaviour::Unavailable),
            SearchOptions::default(),
        );

        let result = engine.search("test").await;
        assert!(matches!(result, Err(QueryError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_malformed_vector_from_store() {
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::with_behaviour(StoreBehaviour::Malformed),
            SearchOptions::default(),
        );

        let result = engine.search("test").await;
        match result {
            Err(QueryError::MalformedStoredVector(msg)) => assert!(msg.contains("paper 9")),
            other => panic!("Expected MalformedStoredVector, got {:?}", other.map(|r| r.query)),
        }
    }

    #[tokio::test]
    async fn test_ragged_result_vectors_fail_request() {
        let items = vec![
            create_test_item(1, 0.0, vec![1.0, 0.0]),
            create_test_item(2, 0.1, vec![1.0, 0.0, 0.0]),
        ];
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(items),
            SearchOptions::default(),
        );

        let result = engine.search("test").await;
        assert!(matches!(result, Err(QueryError::MalformedStoredVector(_))));
    }

    #[tokio::test]
    async fn test_neighbor_option_is_applied() {
        let options = SearchOptions {
            neighbors: 2,
            ..SearchOptions::default()
        };
        let engine = GraphSearchEngine::new(
            MockEmbeddingProvider::new(vec![1.0, 0.0]),
            MockStore::new(ring_items(10)),
            options,
        );

        let response = engine.search("test").await.unwrap();
        assert_eq!(response.links.len(), 20);
    }
}
