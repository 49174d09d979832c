//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for query embedding generation and provides
//! a local implementation backed by fastembed.
//!
//! The abstraction keeps the search pipeline independent of the concrete model:
//! the only contract is "text in, unit-length vector of fixed dimension out".

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Model could not be loaded or configured
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Inference failed
    #[error("Embedding generation failed: {0}")]
    InferenceError(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementations must return vectors of exactly [`dimension`](Self::dimension)
/// entries, normalized to unit L2 length, so that dot products equal cosine
/// similarity downstream.
///
/// # Example Usage
/// ```ignore
/// let provider = FastEmbedProvider::new(None, None)?;
/// let vector = provider.embed("graph neural networks").await?;
/// assert_eq!(vector.len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate a unit-length embedding for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model (e.g., "BGEBaseENV15").
    fn model_name(&self) -> &str;
}

/// Scales `vector` in place to unit L2 length.
///
/// Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }
}
