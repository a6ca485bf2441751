//! Error types for the `ragchat-retrieval` crate.

use thiserror::Error;

/// Errors that can occur while ingesting or retrieving documents.
#[derive(Debug, Error)]
pub enum RagError {
    /// Two vectors of different length were compared, or a vector does not match the
    /// dimensionality of the index it is written to. This is a programming error.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality that was required.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// The embedding provider failed or returned an unusable response.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure, including the original cause.
        message: String,
    },

    /// The vector store backend could not be reached or rejected the request.
    #[error("Vector store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure, including the original cause.
        message: String,
    },

    /// Raw text could not be obtained for an ingestion source.
    #[error("Failed to fetch source '{source_id}': {message}")]
    SourceFetchFailed {
        /// The source identifier (URL or text blob) that failed.
        source_id: String,
        /// A description of the failure.
        message: String,
    },

    /// A required input was missing or empty.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration value was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Stable, cause-free name of the error category.
    ///
    /// Safe to show to end users; the full message should only be logged.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::EmbeddingUnavailable { .. } => "embedding_unavailable",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::SourceFetchFailed { .. } => "source_fetch_failed",
            Self::Validation(_) => "validation_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether a retry of the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable { .. } | Self::StoreUnavailable { .. })
    }

    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn store(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { backend: backend.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
