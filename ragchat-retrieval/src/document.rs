//! Data types for stored documents and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A piece of source text with its embedding, as held by a vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier within the namespace. Inserting an existing id replaces it.
    pub id: String,
    /// The (possibly truncated) text that was embedded.
    pub text: String,
    /// The embedding of `text`.
    pub vector: Vec<f32>,
    /// Free-form key-value metadata, e.g. the source URL.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self { id: id.into(), text: text.into(), vector, metadata: HashMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A retrieved [`Document`] paired with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The retrieved document. Remote backends may omit the vector.
    pub document: Document,
    /// Cosine similarity in `[-1, 1]`; higher is more relevant.
    pub similarity: f32,
}
