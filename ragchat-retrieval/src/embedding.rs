//! Embedding provider seam and the [`Embedder`] that guards it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::resilience::with_timeout;

/// A provider that turns text into a fixed-length vector.
///
/// Implementations wrap a specific backend (OpenAI, a local model, a mock)
/// and report every failure as [`RagError::EmbeddingUnavailable`]. They do
/// not truncate input and do not retry.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors produced, or `0` if not known up front.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;
}

/// Validating wrapper around an [`EmbeddingProvider`].
///
/// Rejects blank input, bounds every provider call with a timeout and makes
/// sure a provider never hands back an empty or wrongly sized vector.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Embedder {
    /// Wrap `provider`, bounding each call by `timeout`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `text`.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if `text` is blank.
    /// - [`RagError::EmbeddingUnavailable`] if the provider fails, times out,
    ///   or returns an empty vector or one of the wrong dimensionality.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::Validation("text to embed must not be empty".to_string()));
        }

        let name = self.provider.name().to_string();
        debug!(provider = %name, text_len = text.len(), "embedding text");

        let timeout = self.timeout;
        let vector = with_timeout(timeout, self.provider.embed(text), || {
            error!(
                provider = %name,
                timeout_ms = timeout.as_millis() as u64,
                "embedding timed out"
            );
            RagError::embedding(&name, format!("no response within {timeout:?}"))
        })
        .await?;

        if vector.is_empty() {
            error!(provider = %name, "provider returned an empty vector");
            return Err(RagError::embedding(&name, "provider returned an empty vector"));
        }
        let expected = self.provider.dimensions();
        if expected != 0 && vector.len() != expected {
            error!(provider = %name, expected, actual = vector.len(), "unexpected vector size");
            return Err(RagError::embedding(
                &name,
                format!("expected {expected} dimensions, got {}", vector.len()),
            ));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmbeddingProvider;

    struct Broken {
        output: Vec<f32>,
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.output.clone())
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    struct Hanging;

    #[async_trait]
    impl EmbeddingProvider for Hanging {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::future::pending().await
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "hanging"
        }
    }

    fn embedder(provider: impl EmbeddingProvider + 'static) -> Embedder {
        Embedder::new(Arc::new(provider), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_calling_provider() {
        let provider = MockEmbeddingProvider::new(4);
        let embedder = Embedder::new(Arc::new(provider.clone()), Duration::from_secs(1));
        let err = embedder.embed("   \n").await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_vector_is_unavailable() {
        let err = embedder(Broken { output: vec![], dims: 0 }).embed("hi").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn partial_vector_is_unavailable() {
        let err =
            embedder(Broken { output: vec![1.0], dims: 3 }).embed("hi").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn hang_becomes_unavailable() {
        let err = embedder(Hanging).embed("hi").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    }
}
