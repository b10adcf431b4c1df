//! Embedding gateway: the contract for the external embedding model plus
//! providers for production (HTTP) and deterministic testing (mock).
//!
//! The engine treats the embedding model as a black box that maps a batch of
//! texts to fixed-dimension vectors. Failures are classified at this boundary:
//! [`EmbeddingError::Transient`] is retried by the ingestion coordinator under
//! its [`RetryPolicy`](crate::ingestion::RetryPolicy), while
//! [`EmbeddingError::Permanent`] fails the run immediately.

pub mod http;

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use http::HttpEmbeddingProvider;

/// Failure reported by an embedding provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Recoverable failure (network hiccup, rate limit); safe to retry.
    #[error("transient embedding failure: {message}")]
    Transient { message: String },

    /// Unrecoverable failure (bad request, auth, exhausted retries).
    #[error("permanent embedding failure: {message}")]
    Permanent { message: String },
}

impl EmbeddingError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns `true` when the failure may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Contract consumed by the ingestion coordinator and search engine.
///
/// Implementations must return exactly one vector per input text, in input
/// order, each with the dimension the store was configured for.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Vectorize a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Deterministic offline provider for tests and demos.
///
/// Identical text always maps to the identical unit-length vector, so
/// fingerprint-skip logic and ranking assertions behave reproducibly without
/// a model behind them.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut values: Vec<f32> = (0..self.dimension)
            .map(|lane| {
                let mut hasher = DefaultHasher::new();
                lane.hash(&mut hasher);
                text.hash(&mut hasher);
                // Map the lane hash into [-1, 1].
                (hasher.finish() as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect();

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let inputs = vec![
            "hello world".to_string(),
            "goodbye world".to_string(),
            "hello world".to_string(),
        ];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], first[2], "identical text, identical vector");
        assert_ne!(first[0], first[1], "distinct text, distinct vector");
    }

    #[tokio::test]
    async fn mock_embeddings_are_unit_length() {
        let provider = MockEmbeddingProvider::new(32);
        let vectors = provider
            .embed_batch(&["some chunk text".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors[0].len(), 32);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn transient_classification() {
        assert!(EmbeddingError::transient("429").is_transient());
        assert!(!EmbeddingError::permanent("401").is_transient());
    }
}
