//! Vector store trait for storing documents and searching them by similarity.

use async_trait::async_trait;

use crate::config::validate_threshold;
use crate::document::{Document, ScoredDocument};
use crate::error::{RagError, Result};

/// A namespace-scoped index of [`Document`]s with similarity search.
///
/// Each instance owns one logical namespace, fixed at construction. All
/// backends share the same contract so the pipelines are backend-agnostic:
///
/// - `insert` is an upsert keyed by [`Document::id`].
/// - `query` returns at most `top_k` results, each with
///   `similarity >= threshold`, ordered by descending similarity.
///
/// Backends may be eventually consistent: a document is not guaranteed to
/// be queryable immediately after `insert` returns.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{Document, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.insert(Document::new("doc_1", "text", vec![0.1, 0.9])).await?;
/// let results = store.query(&[0.1, 0.8], 3, 0.2).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a document.
    async fn insert(&self, document: Document) -> Result<()>;

    /// Search for the `top_k` documents most similar to `vector` whose
    /// similarity is at least `threshold`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>>;

    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// The namespace this store reads and writes.
    fn namespace(&self) -> &str;
}

/// Check the arguments shared by every `query` implementation.
pub fn validate_query(vector: &[f32], top_k: usize, threshold: f32) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::Validation("query vector must not be empty".to_string()));
    }
    if top_k == 0 {
        return Err(RagError::Validation("top_k must be greater than zero".to_string()));
    }
    validate_threshold(threshold).map_err(RagError::Validation)
}

/// Drop results below `threshold` and keep at most `top_k`, preserving order.
///
/// Remote services rank server-side but cannot threshold, so this is applied
/// to their answers locally.
pub fn apply_threshold(
    results: Vec<ScoredDocument>,
    top_k: usize,
    threshold: f32,
) -> Vec<ScoredDocument> {
    results.into_iter().filter(|r| r.similarity >= threshold).take(top_k).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, similarity: f32) -> ScoredDocument {
        ScoredDocument { document: Document::new(id, id, vec![]), similarity }
    }

    #[test]
    fn threshold_filter_keeps_order_and_bound() {
        let results = vec![scored("a", 0.9), scored("b", 0.5), scored("c", 0.1), scored("d", 0.3)];
        let kept = apply_threshold(results, 2, 0.2);
        let ids: Vec<_> = kept.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn query_arguments_are_validated() {
        assert!(validate_query(&[], 3, 0.2).is_err());
        assert!(validate_query(&[1.0], 0, 0.2).is_err());
        assert!(validate_query(&[1.0], 3, 2.0).is_err());
        assert!(validate_query(&[1.0], 3, -1.0).is_ok());
    }
}
