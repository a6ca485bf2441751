//! Error types for the `ragchat-model` crate.

use thiserror::Error;

/// Errors raised by generation providers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider could not be reached, rejected the request, or returned
    /// an unusable response.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure, including the original cause.
        message: String,
    },

    /// The request was empty or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration value was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Stable, cause-free name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerationUnavailable { .. } => "generation_unavailable",
            Self::Validation(_) => "validation_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Shorthand for [`ModelError::GenerationUnavailable`].
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationUnavailable { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for generation calls.
pub type Result<T> = std::result::Result<T, ModelError>;
