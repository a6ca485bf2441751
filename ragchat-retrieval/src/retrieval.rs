//! Retrieval: query → embed → top-K search → threshold.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::RagConfig;
use crate::document::ScoredDocument;
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::resilience::with_timeout;
use crate::vectorstore::VectorStore;

/// Finds the stored documents most similar to a query.
///
/// The two steps are also exposed separately ([`embed_query`](Self::embed_query)
/// and [`search`](Self::search)) so callers can report progress between them.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RetrievalPipeline::builder()
///     .embedding_provider(provider)
///     .vector_store(store)
///     .build()?;
///
/// for hit in pipeline.retrieve_default("How did Zomato shares do?").await? {
///     println!("{:.3} {}", hit.similarity, hit.document.text);
/// }
/// ```
pub struct RetrievalPipeline {
    config: RagConfig,
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed `query`, retrying transient provider failures.
    ///
    /// # Errors
    ///
    /// [`RagError::Validation`] for a blank query, otherwise
    /// [`RagError::EmbeddingUnavailable`] once retries are exhausted.
    #[instrument(name = "retrieval.embed_query", skip_all, fields(query.len = query.len()))]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.config.retry.run("embed_query", || self.embedder.embed(query)).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })
    }

    /// Query the store with an already embedded query.
    ///
    /// An empty result is not an error.
    #[instrument(
        name = "retrieval.search",
        skip(self, vector),
        fields(backend = self.store.backend())
    )]
    pub async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let timeout = self.config.request_timeout;
        let backend = self.store.backend();
        self.config
            .retry
            .run("query", || {
                with_timeout(timeout, self.store.query(vector, top_k, threshold), move || {
                    RagError::store(backend, format!("no response within {timeout:?}"))
                })
            })
            .await
            .map_err(|e| {
                error!(
                    backend,
                    namespace = %self.store.namespace(),
                    error = %e,
                    "vector search failed"
                );
                e
            })
    }

    /// Embed `query` and return up to `top_k` documents with
    /// `similarity >= threshold`, most similar first.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let vector = self.embed_query(query).await?;
        let results = self.search(&vector, top_k, threshold).await?;

        info!(
            result_count = results.len(),
            top_similarity = results.first().map(|r| r.similarity),
            "retrieval completed"
        );
        Ok(results)
    }

    /// [`retrieve`](Self::retrieve) with the configured `top_k` and threshold.
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredDocument>> {
        self.retrieve(query, self.config.top_k, self.config.similarity_threshold).await
    }
}

/// Builder for constructing a [`RetrievalPipeline`].
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Build the [`RetrievalPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider or vector store
    /// is missing.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config = self.config.unwrap_or_default();
        let provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;

        Ok(RetrievalPipeline {
            embedder: Embedder::new(provider, config.request_timeout),
            config,
            store,
        })
    }
}
