//! Embedding service boundary.
//!
//! The processing stage only talks to [`EmbeddingService`]. Concrete backends:
//!
//! - [`HashingEmbedder`]: local feature hashing (default, not semantic)
//! - `HttpEmbedder`: OpenAI-compatible endpoint (feature `remote-embeddings`)

pub mod hashing;
#[cfg(feature = "remote-embeddings")]
pub mod http;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use thiserror::Error;

pub use hashing::HashingEmbedder;
#[cfg(feature = "remote-embeddings")]
pub use http::HttpEmbedder;

/// Errors reported by an embedding service. One error fails the whole call.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service failed: {0}")]
    Service(String),
    #[error("batch returned {got} vectors for {expected} inputs")]
    PartialBatch { expected: usize, got: usize },
    #[error("vector has {got} dimensions, model {model} produces {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
    #[error("embedding backend '{0}' is not available in this build")]
    Unavailable(String),
}

/// Turns text into fixed-length vectors.
pub trait EmbeddingService: Send + Sync {
    /// Identifier stored on every record (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Length of every vector this service returns.
    fn dims(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Whether [`embed_batch`](Self::embed_batch) is cheaper than repeated
    /// [`embed`](Self::embed) calls.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Embed many texts. Output position `i` belongs to input `i`.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Build the service selected in configuration.
pub fn create_service(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingService>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Box::new(HashingEmbedder::with_model(
            config.model.clone(),
            config.dims,
        ))),
        #[cfg(feature = "remote-embeddings")]
        EmbeddingBackend::Http => Ok(Box::new(HttpEmbedder::new(config)?)),
        #[cfg(not(feature = "remote-embeddings"))]
        EmbeddingBackend::Http => Err(EmbeddingError::Unavailable("http".to_string())),
    }
}

/// L2 norm of a vector.
pub fn vector_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&v| (v as f64) * (v as f64))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl EmbeddingService for Doubler {
        fn model_name(&self) -> &str {
            "doubler"
        }
        fn dims(&self) -> usize {
            1
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.len() as f32 * 2.0])
        }
    }

    #[test]
    fn test_default_batch_preserves_order() {
        let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];
        let vectors = Doubler.embed_batch(&texts).unwrap();
        assert_eq!(vectors, vec![vec![2.0], vec![6.0], vec![4.0]]);
        assert!(!Doubler.supports_batch());
    }

    #[test]
    fn test_create_default_service() {
        let service = create_service(&EmbeddingConfig::default()).unwrap();
        assert_eq!(service.dims(), 256);
        assert_eq!(service.model_name(), "feature-hash-v1");
    }

    #[cfg(not(feature = "remote-embeddings"))]
    #[test]
    fn test_http_backend_unavailable_without_feature() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Http,
            endpoint: Some("http://localhost:1".into()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_service(&config),
            Err(EmbeddingError::Unavailable(_))
        ));
    }

    #[test]
    fn test_vector_norm() {
        assert!((vector_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert_eq!(vector_norm(&[]), 0.0);
    }
}
