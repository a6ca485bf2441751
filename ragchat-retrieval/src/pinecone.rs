//! Pinecone vector store backend.
//!
//! Talks to the Pinecone data plane over REST: `POST {host}/vectors/upsert`
//! and `POST {host}/query`, authenticated with the `Api-Key` header. The
//! document text travels in the vector's metadata under `text`, so callers
//! may not use that metadata key themselves.
//!
//! This module is only available when the `pinecone` feature is enabled.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::document::{Document, ScoredDocument};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, apply_threshold, validate_query};

const BACKEND: &str = "pinecone";
const TEXT_KEY: &str = "text";

/// A [`VectorStore`] backed by a namespace of a Pinecone index.
///
/// Upserts overwrite existing ids. Pinecone is eventually consistent, so a
/// freshly upserted document may not be returned by an immediate query.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::pinecone::PineconeVectorStore;
///
/// let store = PineconeVectorStore::new(
///     "https://rag-demo-index-abc123.svc.aped-4627-b74a.pinecone.io",
///     std::env::var("PINECONE_API_KEY")?,
///     "ns1",
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct PineconeVectorStore {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: String,
}

impl PineconeVectorStore {
    /// Create a store for `namespace` of the index served at `host`.
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into();
        let api_key = api_key.into();
        if host.trim().is_empty() {
            return Err(RagError::Config("Pinecone index host must not be empty".into()));
        }
        if api_key.is_empty() {
            return Err(RagError::Config("Pinecone API key must not be empty".into()));
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: namespace.into(),
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .client
            .post(format!("{}{path}", self.host))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(backend = BACKEND, path, error = %e, "request failed");
                RagError::store(BACKEND, format!("request to {path} failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(backend = BACKEND, path, %status, "API error");
            return Err(RagError::store(BACKEND, format!("{path} returned {status}: {body}")));
        }

        response.json().await.map_err(|e| {
            error!(backend = BACKEND, path, error = %e, "failed to parse response");
            RagError::store(BACKEND, format!("failed to parse {path} response: {e}"))
        })
    }
}

// ── Pinecone API request/response types ────────────────────────────

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: HashMap<&'a str, &'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct Match {
    id: String,
    score: f32,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl Match {
    fn into_scored(self) -> ScoredDocument {
        let mut text = String::new();
        let mut metadata = HashMap::new();
        for (key, value) in self.metadata {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            if key == TEXT_KEY {
                text = value;
            } else {
                metadata.insert(key, value);
            }
        }
        ScoredDocument {
            document: Document { id: self.id, text, vector: self.values, metadata },
            similarity: self.score,
        }
    }
}

// ── VectorStore implementation ─────────────────────────────────────

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn insert(&self, document: Document) -> Result<()> {
        if document.vector.is_empty() {
            return Err(RagError::Validation(format!(
                "document '{}' has an empty vector",
                document.id
            )));
        }

        if document.metadata.contains_key(TEXT_KEY) {
            return Err(RagError::Validation(format!(
                "document '{}': metadata key '{TEXT_KEY}' is reserved for the document text",
                document.id
            )));
        }

        let mut metadata: HashMap<&str, &str> =
            document.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        metadata.insert(TEXT_KEY, &document.text);

        let request = UpsertRequest {
            vectors: vec![UpsertVector { id: &document.id, values: &document.vector, metadata }],
            namespace: &self.namespace,
        };
        let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;

        debug!(
            backend = BACKEND,
            namespace = %self.namespace,
            document.id = %document.id,
            upserted = response.upserted_count,
            "upserted document"
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        validate_query(vector, top_k, threshold)?;

        let request = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: true,
        };
        let response: QueryResponse = self.post("/query", &request).await?;

        let mut matches: Vec<ScoredDocument> =
            response.matches.into_iter().map(Match::into_scored).collect();
        // Match order is not guaranteed by every API version.
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        let results = apply_threshold(matches, top_k, threshold);

        debug!(
            backend = BACKEND,
            namespace = %self.namespace,
            result_count = results.len(),
            "pinecone query"
        );
        Ok(results)
    }

    fn backend(&self) -> &str {
        BACKEND
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
