//! Configuration for ingestion and retrieval.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::resilience::RetryPolicy;

/// Approximate number of characters per token used for truncation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Tunables shared by the ingestion and retrieval pipelines.
///
/// The defaults (`top_k = 3`, `similarity_threshold = 0.2`, `max_tokens = 2000`)
/// are empirical starting points; every value can be overridden through the
/// builder or the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum cosine similarity for a result to be kept.
    pub similarity_threshold: f32,
    /// Token budget for ingested text; text is cut at `max_tokens * 4` characters.
    pub max_tokens: usize,
    /// Upper bound for a single embedding or store call.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Retry policy for transient embedding and store failures.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.2,
            max_tokens: 2000,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Maximum number of characters of source text that is embedded.
    pub fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(CHARS_PER_TOKEN)
    }

    /// Load overrides from the process environment.
    ///
    /// See [`RagConfig::from_lookup`] for the recognised variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through `lookup`, starting from the defaults.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `RAG_TOP_K` | `top_k` |
    /// | `RAG_SIMILARITY_THRESHOLD` | `similarity_threshold` |
    /// | `RAG_MAX_TOKENS` | `max_tokens` |
    /// | `RAG_REQUEST_TIMEOUT_SECS` | `request_timeout` |
    /// | `RAG_RETRY_ATTEMPTS` | `retry.max_attempts` |
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(v) = parse_var::<usize>(&lookup, "RAG_TOP_K")? {
            builder = builder.top_k(v);
        }
        if let Some(v) = parse_var::<f32>(&lookup, "RAG_SIMILARITY_THRESHOLD")? {
            builder = builder.similarity_threshold(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, "RAG_MAX_TOKENS")? {
            builder = builder.max_tokens(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "RAG_REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u32>(&lookup, "RAG_RETRY_ATTEMPTS")? {
            let retry = RetryPolicy { max_attempts: v, ..RetryPolicy::default() };
            builder = builder.retry(retry);
        }
        builder.build()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::Config(format!("{key}={raw:?} is invalid: {e}"))),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the token budget used to truncate ingested text.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the timeout applied to each embedding and store call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `top_k == 0`
    /// - `similarity_threshold` is outside `[-1, 1]` or not a number
    /// - `max_tokens == 0`
    /// - `request_timeout` is zero
    /// - `retry.max_attempts == 0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        validate_threshold(config.similarity_threshold).map_err(RagError::Config)?;
        if config.max_tokens == 0 {
            return Err(RagError::Config("max_tokens must be greater than zero".to_string()));
        }
        if config.request_timeout.is_zero() {
            return Err(RagError::Config("request_timeout must be non-zero".to_string()));
        }
        if config.retry.max_attempts == 0 {
            return Err(RagError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(config)
    }
}

/// Check that a similarity threshold lies within `[-1, 1]`.
pub(crate) fn validate_threshold(threshold: f32) -> std::result::Result<(), String> {
    if (-1.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(format!("similarity threshold must be within [-1, 1], got {threshold}"))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
