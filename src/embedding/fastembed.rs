//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation.
//!
//! The model is loaded once and shared without a lock; inference runs on the
//! blocking thread pool so a slow embedding does not stall the async executor
//! or other requests.

use super::{l2_normalize, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Model used when none is specified; matches the catalog's stored vectors.
pub const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::BGEBaseENV15;

/// FastEmbed embedding provider.
///
/// Holds a loaded ONNX model. Cloning is cheap and shares the same model
/// instance; concurrent calls run inference in parallel.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance
    model: Arc<TextEmbedding>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

/// Output dimension of `model`, as listed in fastembed's model registry.
pub fn model_dimension(model: &EmbeddingModel) -> EmbeddingResult<usize> {
    TextEmbedding::get_model_info(model)
        .map(|info| info.dim)
        .map_err(|e| EmbeddingError::ConfigError(format!("No model info for {:?}: {}", model, e)))
}

/// Resolve a supported model from its variant name (e.g., "BGEBaseENV15") or
/// its model code (e.g., "BAAI/bge-base-en-v1.5").
///
/// Matching is case-insensitive.
pub fn parse_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            format!("{:?}", info.model).eq_ignore_ascii_case(name)
                || info.model_code.eq_ignore_ascii_case(name)
        })
        .map(|info| info.model)
        .ok_or_else(|| EmbeddingError::ConfigError(format!("Unknown embedding model: {}", name)))
}

impl FastEmbedProvider {
    /// Load a FastEmbed model.
    ///
    /// # Arguments
    /// * `model` - Model to use (defaults to [`DEFAULT_MODEL`])
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(DEFAULT_MODEL);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = model_dimension(&model_type)?;

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        info!("Loading embedding model {}", model_name);
        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(text_embedding),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let model = Arc::clone(&self.model);
        let input = text.to_string();
        let embeddings = tokio::task::spawn_blocking(move || model.embed(vec![input], None))
            .await
            .map_err(|e| EmbeddingError::InferenceError(format!("Embedding task failed: {}", e)))?
            .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?;

        let mut vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InferenceError("No embedding generated".to_string()))?;

        if vector.len() != self.embedding_dimension {
            return Err(EmbeddingError::InferenceError(format!(
                "Model returned {} dimensions, expected {}",
                vector.len(),
                self.embedding_dimension
            )));
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model() {
        assert!(matches!(parse_model("BGEBaseENV15"), Ok(EmbeddingModel::BGEBaseENV15)));
        assert!(matches!(parse_model("allminilml6v2"), Ok(EmbeddingModel::AllMiniLML6V2)));
        assert!(matches!(parse_model("AllMiniLML12V2"), Ok(EmbeddingModel::AllMiniLML12V2)));
        assert!(matches!(parse_model("BAAI/bge-base-en-v1.5"), Ok(EmbeddingModel::BGEBaseENV15)));
        assert!(matches!(parse_model("word2vec"), Err(EmbeddingError::ConfigError(_))));
    }

    #[test]
    fn test_model_dimension() {
        assert_eq!(model_dimension(&EmbeddingModel::BGEBaseENV15).unwrap(), 768);
        assert_eq!(model_dimension(&EmbeddingModel::BGESmallENV15).unwrap(), 384);
        assert_eq!(model_dimension(&EmbeddingModel::BGELargeENV15).unwrap(), 1024);
    }

    #[test]
    fn test_model_dimension_covers_every_supported_model() {
        assert_eq!(model_dimension(&EmbeddingModel::AllMiniLML12V2).unwrap(), 384);
        assert_eq!(model_dimension(&EmbeddingModel::BGESmallENV15Q).unwrap(), 384);

        for info in TextEmbedding::list_supported_models() {
            assert_eq!(model_dimension(&info.model).unwrap(), info.dim);
            assert!(matches!(parse_model(&format!("{:?}", info.model)), Ok(ref m) if *m == info.model));
        }
    }

    // The tests below download model weights on first run.

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_is_unit_length() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::BGESmallENV15), None).unwrap();
        let embedding = provider.embed("sparse attention for long documents").await.unwrap();

        assert_eq!(embedding.len(), provider.dimension());
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_empty_text() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::BGESmallENV15), None).unwrap();

        let result = provider.embed("").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));

        let whitespace = provider.embed("  \n ").await.unwrap();
        assert_eq!(whitespace.len(), provider.dimension());
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_concurrent_embeds_share_one_model() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::BGESmallENV15), None).unwrap();
        let other = provider.clone();

        let (first, second) = tokio::join!(
            provider.embed("parallel inference"),
            other.embed("parallel inference")
        );
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_consistency() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::BGESmallENV15), None).unwrap();
        let first = provider.embed("Consistency test text").await.unwrap();
        let second = provider.embed("Consistency test text").await.unwrap();

        assert_eq!(first, second);
    }
}
