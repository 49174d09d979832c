//! Nearest-neighbor store abstraction and implementations.
//!
//! This module defines the interface for retrieving the catalog entries closest
//! to a query vector. The search pipeline treats the store as an opaque service:
//! it hands over a vector, a limit and a metric, and gets back ranked items
//! together with their own stored embeddings.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ResultItem;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database could not be opened
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Schema creation or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A stored embedding could not be turned into a usable vector
    #[error("Malformed embedding for paper {id}: {reason}")]
    MalformedVector { id: i64, reason: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Distance metric used to rank catalog entries against the query.
///
/// Smaller is closer for every metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in [0, 2]
    #[default]
    Cosine,

    /// Euclidean distance
    L2,

    /// Negated dot product
    InnerProduct,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

/// Trait for nearest-neighbor stores.
///
/// Implementations return at most `limit` items ordered by ascending distance
/// to `query`. Items without a stored embedding are never returned, and no
/// paper appears twice.
#[async_trait]
pub trait NearestNeighborStore: Send + Sync {
    /// Retrieve the catalog entries closest to `query`.
    ///
    /// # Errors
    /// Returns `StorageError::MalformedVector` if a candidate's stored
    /// embedding cannot be parsed or has the wrong dimension, and other
    /// `StorageError` variants if the store is unreachable.
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
        metric: DistanceMetric,
    ) -> StorageResult<Vec<ResultItem>>;
}

/// Parse a stored vector such as `[0.1,-0.2,3e-4]`.
///
/// The catalog stores embeddings as JSON arrays of numbers. Elements must be
/// finite once narrowed to `f32`.
pub fn parse_vector_literal(text: &str) -> Result<Vec<f32>, String> {
    let vector: Vec<f32> = serde_json::from_str(text).map_err(|e| e.to_string())?;
    match vector.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(format!("element {} is out of f32 range", index)),
        None => Ok(vector),
    }
}

/// Render a vector in the form accepted by [`parse_vector_literal`].
///
/// # Errors
/// Returns `StorageError::QueryError` if the vector holds NaN or infinite values
pub fn format_vector_literal(vector: &[f32]) -> StorageResult<String> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(StorageError::QueryError(
            "cannot store a vector with non-finite elements".to_string(),
        ));
    }
    serde_json::to_string(vector).map_err(|e| StorageError::QueryError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_vector_literal() {
        assert_eq!(parse_vector_literal("[1,2.5,-3]").unwrap(), vec![1.0, 2.5, -3.0]);
        assert_eq!(parse_vector_literal("[]").unwrap(), Vec::<f32>::new());

        let spaced = parse_vector_literal(" [ 0.1 , 1e-3 ] ").unwrap();
        assert_eq!(spaced.len(), 2);
        assert_abs_diff_eq!(spaced[0], 0.1, epsilon = 1e-7);
        assert_abs_diff_eq!(spaced[1], 0.001, epsilon = 1e-7);
    }

    #[test]
    fn test_parse_vector_literal_rejects_garbage() {
        assert!(parse_vector_literal("1,2,3").is_err());
        assert!(parse_vector_literal("[1,,2]").is_err());
        assert!(parse_vector_literal("[1,abc]").is_err());
        assert!(parse_vector_literal("[1,NaN]").is_err());
        assert!(parse_vector_literal("[1,inf]").is_err());
        assert!(parse_vector_literal("[1,null]").is_err());
        assert!(parse_vector_literal("[1,2] trailing").is_err());
        assert!(parse_vector_literal("[1e300]").is_err());
    }

    #[test]
    fn test_format_vector_literal_is_parseable() {
        let vector = vec![0.267_261_24, -0.534_522_5, 0.801_783_7];
        let literal = format_vector_literal(&vector).unwrap();
        assert!(literal.starts_with('[') && literal.ends_with(']'));

        let parsed = parse_vector_literal(&literal).unwrap();
        assert_eq!(parsed.len(), vector.len());
        for (a, b) in parsed.iter().zip(&vector) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_format_vector_literal_rejects_non_finite() {
        assert!(matches!(
            format_vector_literal(&[1.0, f32::NAN]),
            Err(StorageError::QueryError(_))
        ));
        assert!(format_vector_literal(&[f32::INFINITY]).is_err());
    }

    #[test]
    fn test_cosine_distance() {
        let metric = DistanceMetric::Cosine;
        assert_abs_diff_eq!(metric.distance(&[1.0, 0.0], &[1.0, 0.0]), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(metric.distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(metric.distance(&[1.0, 0.0], &[-1.0, 0.0]), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(metric.distance(&[2.0, 0.0], &[3.0, 0.0]), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_and_inner_product_distance() {
        assert_abs_diff_eq!(DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            DistanceMetric::InnerProduct.distance(&[1.0, 2.0], &[3.0, 4.0]),
            -11.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_default_metric_is_cosine() {
        assert_eq!(DistanceMetric::default(), DistanceMetric::Cosine);
    }
}
