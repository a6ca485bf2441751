//! Deterministic embedding provider for tests and offline demos.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

#[derive(Debug, Default)]
struct MockState {
    vectors: RwLock<HashMap<String, Vec<f32>>>,
    failing: RwLock<HashSet<String>>,
    calls: AtomicUsize,
}

/// An [`EmbeddingProvider`] that needs no network.
///
/// Texts registered with [`with_vector`](Self::with_vector) map to that exact
/// vector; any other text gets a normalised hash-derived vector so equal
/// texts always embed identically. Texts registered with
/// [`fail_on`](Self::fail_on) produce [`RagError::EmbeddingUnavailable`].
///
/// Clones share their state, so a test can keep a handle and inspect
/// [`call_count`](Self::call_count) after handing the provider to a pipeline.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    delay: Option<Duration>,
    state: Arc<MockState>,
}

impl MockEmbeddingProvider {
    /// Create a provider producing `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, delay: None, state: Arc::default() }
    }

    /// Map `text` to a fixed vector.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        if let Ok(mut vectors) = self.state.vectors.write() {
            vectors.insert(text.into(), vector);
        }
        self
    }

    /// Make embedding `text` fail.
    pub fn fail_on(self, text: impl Into<String>) -> Self {
        if let Ok(mut failing) = self.state.failing.write() {
            failing.insert(text.into());
        }
        self
    }

    /// Sleep for `delay` before answering, to exercise interleaving and timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `embed` calls made so far across all clones.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn hash_embedding(&self, text: &str) -> Vec<f32> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut v: Vec<f32> = (0..self.dimensions)
            .map(|i| ((hash.wrapping_add(i as u64)) as f32).sin())
            .collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.state.failing.read().map(|f| f.contains(text)).unwrap_or(false);
        if failing {
            return Err(RagError::embedding("mock", format!("scripted failure for {text:?}")));
        }

        let fixed = self.state.vectors.read().ok().and_then(|v| v.get(text).cloned());
        Ok(fixed.unwrap_or_else(|| self.hash_embedding(text)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}
