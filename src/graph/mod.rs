//! Similarity graph construction over a result set.
//!
//! Given the stored embeddings of the retrieved papers, this module computes the
//! full pairwise similarity matrix in one batched multiply and derives a sparse
//! directed k-nearest-neighbor graph: every node points at its `k` most similar
//! other nodes.
//!
//! # Self-exclusion
//!
//! A node's own column always carries the maximum similarity (≈1.0 for unit
//! vectors), so it has to be removed before picking neighbors. How that happens
//! is a [`SelfExclusion`] policy:
//!
//! - [`SelfExclusion::DropHighest`] drops the top-ranked entry of the row,
//!   whichever column it is. With exact duplicate vectors the top entry may be
//!   the duplicate rather than the node itself, which yields a self-loop and
//!   loses the duplicate as a neighbor. This is the default.
//! - [`SelfExclusion::SkipOwnIndex`] removes the node's own column and never
//!   produces self-loops.

use ndarray::{Array2, ArrayView1};
use thiserror::Error;
use tracing::debug;

use crate::models::SimilarityEdge;

/// Number of neighbors each node links to unless configured otherwise.
pub const DEFAULT_NEIGHBORS: usize = 5;

/// Errors raised while building the graph.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// `vectors` and `ids` are not parallel
    #[error("Got {vectors} vectors but {ids} ids")]
    LengthMismatch { vectors: usize, ids: usize },

    /// A vector's length differs from the first vector's
    #[error("Vector {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Vectors could not be laid out as a matrix
    #[error("Invalid matrix shape: {0}")]
    Shape(String),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// How a node's own entry is removed from its similarity ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfExclusion {
    /// Drop the first entry of the ranking (first occurrence of the maximum).
    #[default]
    DropHighest,

    /// Remove the node's own index from the ranking.
    SkipOwnIndex,
}

impl SelfExclusion {
    /// Apply the policy to a ranking of row `row_index`.
    ///
    /// `ranking` holds column indices ordered by descending similarity.
    pub fn apply(&self, ranking: Vec<usize>, row_index: usize) -> Vec<usize> {
        match self {
            SelfExclusion::DropHighest => ranking.into_iter().skip(1).collect(),
            SelfExclusion::SkipOwnIndex => {
                ranking.into_iter().filter(|&j| j != row_index).collect()
            }
        }
    }
}

/// Builds a directed k-nearest-neighbor graph from result embeddings.
///
/// # Example
/// ```
/// use arxiv_graph_search::graph::SimilarityGraphBuilder;
///
/// let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
/// let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
/// let edges = SimilarityGraphBuilder::new().build(&vectors, &ids).unwrap();
/// assert_eq!(edges.len(), 6);
/// assert_eq!(edges[0].target, "c");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SimilarityGraphBuilder {
    neighbors: usize,
    self_exclusion: SelfExclusion,
}

impl Default for SimilarityGraphBuilder {
    fn default() -> Self {
        Self {
            neighbors: DEFAULT_NEIGHBORS,
            self_exclusion: SelfExclusion::default(),
        }
    }
}

impl SimilarityGraphBuilder {
    /// Builder with `k = 5` and [`SelfExclusion::DropHighest`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of neighbors per node.
    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors;
        self
    }

    /// Set the self-exclusion policy.
    pub fn with_self_exclusion(mut self, policy: SelfExclusion) -> Self {
        self.self_exclusion = policy;
        self
    }

    pub fn neighbors(&self) -> usize {
        self.neighbors
    }

    pub fn self_exclusion(&self) -> SelfExclusion {
        self.self_exclusion
    }

    /// Build the edge list for `vectors`, labelling nodes with `ids`.
    ///
    /// Edges are grouped by source in input order; within a source they are
    /// ordered by descending weight, ties by ascending index. Each source has
    /// at most `min(k, N - 1)` edges.
    ///
    /// # Errors
    /// Returns `GraphError` if the inputs are not parallel or the vectors do
    /// not share one dimension.
    pub fn build(&self, vectors: &[Vec<f32>], ids: &[String]) -> GraphResult<Vec<SimilarityEdge>> {
        if vectors.len() != ids.len() {
            return Err(GraphError::LengthMismatch {
                vectors: vectors.len(),
                ids: ids.len(),
            });
        }

        let similarities = similarity_matrix(vectors)?;
        let mut edges = Vec::with_capacity(vectors.len() * self.neighbors);

        for (i, row) in similarities.outer_iter().enumerate() {
            for j in self.select_neighbors(row, i) {
                edges.push(SimilarityEdge {
                    source: ids[i].clone(),
                    target: ids[j].clone(),
                    weight: row[j],
                });
            }
        }

        debug!(nodes = vectors.len(), edges = edges.len(), "Similarity graph built");
        Ok(edges)
    }

    /// Column indices that row `i` links to, strongest first.
    pub fn select_neighbors(&self, row: ArrayView1<'_, f32>, i: usize) -> Vec<usize> {
        let ranked = self.self_exclusion.apply(rank_descending(row), i);
        ranked.into_iter().take(self.neighbors).collect()
    }
}

/// Pairwise dot products `S = V · Vᵀ` of the given vectors.
///
/// For unit vectors `S[i][j]` is the cosine similarity of `i` and `j`.
///
/// # Errors
/// Returns `GraphError::DimensionMismatch` for ragged input.
pub fn similarity_matrix(vectors: &[Vec<f32>]) -> GraphResult<Array2<f32>> {
    let n = vectors.len();
    let dimension = vectors.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(n * dimension);
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(GraphError::DimensionMismatch {
                index,
                expected: dimension,
                found: vector.len(),
            });
        }
        flat.extend_from_slice(vector);
    }

    let matrix = Array2::from_shape_vec((n, dimension), flat)
        .map_err(|e| GraphError::Shape(e.to_string()))?;
    Ok(matrix.dot(&matrix.t()))
}

/// Indices of `row` ordered by descending value; equal values keep index order.
pub fn rank_descending(row: ArrayView1<'_, f32>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
    order
}
