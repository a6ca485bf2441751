//! In-memory vector store using cosine similarity.
//!
//! [`InMemoryVectorStore`] keeps documents in insertion order behind a
//! `tokio::sync::RwLock`: queries run concurrently, inserts are serialized.
//! Every query is a linear scan, so this backend is meant for small,
//! session-scoped corpora.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Document, ScoredDocument};
use crate::error::{RagError, Result};
use crate::math::cosine_similarity;
use crate::vectorstore::{VectorStore, validate_query};

const BACKEND: &str = "memory";

#[derive(Debug)]
struct Entry {
    document: Document,
    last_used: AtomicU64,
}

#[derive(Debug, Default)]
struct Index {
    /// Kept in insertion order; ties in similarity are broken by position.
    entries: Vec<Entry>,
    dimensions: Option<usize>,
}

/// An in-memory, linear-scan [`VectorStore`].
///
/// The first inserted vector fixes the dimensionality of the namespace
/// unless it was set with [`with_dimensions`](Self::with_dimensions).
/// Without a capacity the store grows without bound; with
/// [`with_capacity`](Self::with_capacity) the least recently used document
/// (last inserted or returned by a query) is evicted to make room.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new().with_capacity(1_000);
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    namespace: String,
    capacity: Option<usize>,
    index: RwLock<Index>,
    clock: AtomicU64,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    /// Create a new, empty, unbounded store in the `default` namespace.
    pub fn new() -> Self {
        Self {
            namespace: "default".to_string(),
            capacity: None,
            index: RwLock::new(Index::default()),
            clock: AtomicU64::new(0),
        }
    }

    /// Set the namespace name reported by [`VectorStore::namespace`].
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Fix the dimensionality up front instead of taking it from the first insert.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.index.get_mut().dimensions = Some(dimensions);
        self
    }

    /// Bound the store to `capacity` documents with least-recently-used eviction.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.index.read().await.entries.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dimensionality of the namespace, once known.
    pub async fn dimensions(&self) -> Option<usize> {
        self.index.read().await.dimensions
    }

    /// Whether a document with `id` is stored.
    pub async fn contains(&self, id: &str) -> bool {
        self.index.read().await.entries.iter().any(|e| e.document.id == id)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, document: Document) -> Result<()> {
        if document.vector.is_empty() {
            return Err(RagError::Validation(format!(
                "document '{}' has an empty vector",
                document.id
            )));
        }

        let mut index = self.index.write().await;
        let actual = document.vector.len();
        match index.dimensions {
            Some(expected) if expected != actual => {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => index.dimensions = Some(actual),
        }

        let stamp = self.tick();
        if let Some(existing) = index.entries.iter_mut().find(|e| e.document.id == document.id) {
            debug!(namespace = %self.namespace, document.id = %document.id, "replacing document");
            existing.document = document;
            existing.last_used.store(stamp, Ordering::Relaxed);
            return Ok(());
        }

        if let Some(capacity) = self.capacity {
            while index.entries.len() >= capacity {
                let lru = index
                    .entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                    .map(|(i, _)| i);
                let Some(position) = lru else { break };
                let evicted = index.entries.remove(position);
                debug!(
                    namespace = %self.namespace,
                    document.id = %evicted.document.id,
                    capacity,
                    "evicted least recently used document"
                );
            }
        }

        debug!(namespace = %self.namespace, document.id = %document.id, "inserted document");
        index.entries.push(Entry { document, last_used: AtomicU64::new(stamp) });
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        validate_query(vector, top_k, threshold)?;

        let index = self.index.read().await;
        if let Some(expected) = index.dimensions {
            if expected != vector.len() {
                return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
            }
        }

        let mut scored = Vec::new();
        for (position, entry) in index.entries.iter().enumerate() {
            let similarity = cosine_similarity(&entry.document.vector, vector)?;
            if similarity >= threshold {
                scored.push((position, similarity));
            }
        }

        // Stable sort: equal similarities keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        let stamp = self.tick();
        let results = scored
            .into_iter()
            .map(|(position, similarity)| {
                let entry = &index.entries[position];
                entry.last_used.store(stamp, Ordering::Relaxed);
                ScoredDocument { document: entry.document.clone(), similarity }
            })
            .collect::<Vec<_>>();

        debug!(namespace = %self.namespace, result_count = results.len(), "in-memory query");
        Ok(results)
    }

    fn backend(&self) -> &str {
        BACKEND
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, vector: Vec<f32>) -> Document {
        Document::new(id, format!("text of {id}"), vector)
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.insert(doc("first", vec![1.0, 0.0])).await.unwrap();
        store.insert(doc("second", vec![2.0, 0.0])).await.unwrap();
        store.insert(doc("third", vec![0.5, 0.0])).await.unwrap();

        let results = store.query(&[1.0, 0.0], 3, 0.0).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn insert_with_existing_id_replaces_in_place() {
        let store = InMemoryVectorStore::new();
        store.insert(doc("a", vec![1.0, 0.0])).await.unwrap();
        store.insert(doc("b", vec![1.0, 0.0])).await.unwrap();
        store.insert(Document::new("a", "updated", vec![1.0, 0.0])).await.unwrap();

        assert_eq!(store.len().await, 2);
        let results = store.query(&[1.0, 0.0], 2, 0.0).await.unwrap();
        assert_eq!(results[0].document.id, "a");
        assert_eq!(results[0].document.text, "updated");
    }

    #[tokio::test]
    async fn first_insert_fixes_dimensionality() {
        let store = InMemoryVectorStore::new();
        store.insert(doc("a", vec![1.0, 0.0, 0.0])).await.unwrap();
        let err = store.insert(doc("b", vec![1.0, 0.0])).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
        let err = store.query(&[1.0], 1, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn explicit_dimensions_are_enforced() {
        let store = InMemoryVectorStore::new().with_dimensions(4);
        assert_eq!(store.dimensions().await, Some(4));
        assert!(store.insert(doc("a", vec![1.0, 0.0])).await.is_err());
    }

    #[tokio::test]
    async fn empty_vector_is_rejected() {
        let store = InMemoryVectorStore::new();
        let err = store.insert(doc("a", vec![])).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let store = InMemoryVectorStore::new().with_capacity(2);
        store.insert(doc("old", vec![1.0, 0.0])).await.unwrap();
        store.insert(doc("newer", vec![0.0, 1.0])).await.unwrap();

        // Touch "old" so that "newer" becomes the least recently used.
        let hits = store.query(&[1.0, 0.0], 1, 0.5).await.unwrap();
        assert_eq!(hits[0].document.id, "old");

        store.insert(doc("newest", vec![1.0, 1.0])).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.contains("old").await);
        assert!(store.contains("newest").await);
        assert!(!store.contains("newer").await);
    }

    #[tokio::test]
    async fn query_on_empty_store_is_empty() {
        let store = InMemoryVectorStore::new();
        assert!(store.query(&[0.1, 0.2], 3, 0.2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_top_k_is_rejected() {
        let store = InMemoryVectorStore::new();
        let err = store.query(&[0.1], 0, 0.2).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}
