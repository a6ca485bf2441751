//! Ingestion: source → text → truncate → embed → store.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_retrieval::{IngestionPipeline, InMemoryVectorStore, MockEmbeddingProvider};
//!
//! let pipeline = IngestionPipeline::builder()
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(8)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let report = pipeline.ingest_batch(&["Zomato share price rose 5%".to_string()]).await;
//! assert_eq!(report.stored(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::RagConfig;
use crate::document::Document;
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::resilience::with_timeout;
use crate::source::{RawTextSource, TextSource};
use crate::vectorstore::VectorStore;

/// Metadata key under which the source identifier is stored.
pub const SOURCE_METADATA_KEY: &str = "source";

/// Cut `text` to at most `max_chars` characters, on a character boundary.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Result of ingesting one source of a batch.
#[derive(Debug)]
pub struct IngestOutcome {
    /// The source identifier as given by the caller.
    pub source: String,
    /// The document id assigned to the source.
    pub id: String,
    /// Whether the document was stored.
    pub result: Result<()>,
}

impl IngestOutcome {
    /// Whether the document was stored.
    pub fn is_stored(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-item outcomes of a batch, in input order.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    /// Number of sources that were stored.
    pub fn stored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_stored()).count()
    }

    /// Number of sources that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.stored()
    }

    /// Ids of the stored documents.
    pub fn stored_ids(&self) -> Vec<&str> {
        self.outcomes.iter().filter(|o| o.is_stored()).map(|o| o.id.as_str()).collect()
    }

    /// A serializable summary that exposes error kinds but not causes.
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            stored: self.stored(),
            failed: self.failed(),
            results: self
                .outcomes
                .iter()
                .map(|o| IngestItem {
                    source: o.source.clone(),
                    id: o.id.clone(),
                    status: if o.is_stored() { "stored" } else { "failed" },
                    error: o.result.as_ref().err().map(RagError::kind),
                })
                .collect(),
        }
    }
}

/// Wire form of an [`IngestReport`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestSummary {
    pub stored: usize,
    pub failed: usize,
    pub results: Vec<IngestItem>,
}

/// Wire form of an [`IngestOutcome`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestItem {
    pub source: String,
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Ingests sources into a [`VectorStore`].
///
/// Every external call is bounded by the configured timeout and transient
/// failures are retried according to the configured policy. Batches fan out
/// concurrently and one failing source never affects the others.
pub struct IngestionPipeline {
    config: RagConfig,
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    source: Arc<dyn TextSource>,
    sequence: AtomicU64,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Generate a document id of the form `doc_{unix_millis}_{n}`.
    pub fn next_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("doc_{}_{n}", chrono::Utc::now().timestamp_millis())
    }

    /// Embed `source_text` and store it under `id`.
    ///
    /// The text is truncated to `max_tokens * 4` characters first. Nothing
    /// is stored unless the embedding succeeds.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if `id` or the text is empty.
    /// - [`RagError::EmbeddingUnavailable`] / [`RagError::StoreUnavailable`]
    ///   once retries are exhausted.
    /// - [`RagError::DimensionMismatch`] if the store holds vectors of
    ///   another size.
    pub async fn ingest(&self, source_text: &str, id: &str) -> Result<()> {
        self.ingest_document(source_text, id, None).await
    }

    async fn ingest_document(
        &self,
        source_text: &str,
        id: &str,
        source: Option<&str>,
    ) -> Result<()> {
        if id.trim().is_empty() {
            return Err(RagError::Validation("document id must not be empty".to_string()));
        }

        let max_chars = self.config.max_chars();
        let text = truncate(source_text, max_chars);
        if text.len() < source_text.len() {
            debug!(
                document.id = %id,
                max_chars,
                original_len = source_text.len(),
                "truncated source text"
            );
        }

        let retry = self.config.retry;
        let vector = retry.run("embed", || self.embedder.embed(text)).await.map_err(|e| {
            error!(document.id = %id, error = %e, "embedding failed during ingestion");
            e
        })?;

        let mut document = Document::new(id, text, vector);
        if let Some(source) = source {
            document = document.with_metadata(SOURCE_METADATA_KEY, source);
        }

        let timeout = self.config.request_timeout;
        let backend = self.store.backend();
        retry
            .run("insert", || {
                with_timeout(timeout, self.store.insert(document.clone()), move || {
                    RagError::store(backend, format!("no response within {timeout:?}"))
                })
            })
            .await
            .map_err(|e| {
                error!(document.id = %id, backend, error = %e, "insert failed during ingestion");
                e
            })?;

        info!(
            document.id = %id,
            namespace = %self.store.namespace(),
            text_len = text.len(),
            "ingested document"
        );
        Ok(())
    }

    /// Resolve `source` through the text source and ingest it under a fresh id.
    pub async fn ingest_source(&self, source: &str) -> IngestOutcome {
        let id = self.next_id();
        let span = info_span!("ingest_source", document.id = %id);
        let result = async {
            let timeout = self.config.request_timeout;
            let text = with_timeout(timeout, self.source.fetch(source), || {
                RagError::SourceFetchFailed {
                    source_id: source.to_string(),
                    message: format!("no response within {timeout:?}"),
                }
            })
            .await?;
            self.ingest_document(&text, &id, Some(source)).await
        }
        .instrument(span)
        .await;

        if let Err(e) = &result {
            warn!(document.id = %id, error.kind = e.kind(), error = %e, "source not ingested");
        }
        IngestOutcome { source: source.to_string(), id, result }
    }

    /// Ingest every source concurrently and report one outcome per source.
    ///
    /// An empty batch is a successful, empty report.
    pub async fn ingest_batch(&self, sources: &[String]) -> IngestReport {
        let outcomes = join_all(sources.iter().map(|s| self.ingest_source(s))).await;
        let report = IngestReport { outcomes };
        info!(
            source_count = sources.len(),
            stored = report.stored(),
            failed = report.failed(),
            "ingestion batch completed"
        );
        report
    }
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// The embedding provider and vector store are required; the configuration
/// defaults to [`RagConfig::default`] and the text source to [`RawTextSource`].
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    text_source: Option<Arc<dyn TextSource>>,
}

impl IngestionPipelineBuilder {
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

    /// Set how source identifiers are turned into text.
    pub fn text_source(mut self, source: Arc<dyn TextSource>) -> Self {
        self.text_source = Some(source);
        self
    }

    /// Build the [`IngestionPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider or vector store
    /// is missing.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.unwrap_or_default();
        let provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;
        let source = self.text_source.unwrap_or_else(|| Arc::new(RawTextSource));

        Ok(IngestionPipeline {
            embedder: Embedder::new(provider, config.request_timeout),
            config,
            store,
            source,
            sequence: AtomicU64::new(0),
        })
    }
}
