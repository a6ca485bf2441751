//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC. The
//! namespace maps to a Qdrant collection with cosine distance, created on
//! the first insert.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_retrieval::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334", "ns1")?;
//! store.insert(document).await?;
//! let results = store.query(&query_embedding, 3, 0.2).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use crate::document::{Document, ScoredDocument};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, apply_threshold, validate_query};

const BACKEND: &str = "qdrant";
const TEXT_KEY: &str = "text";
const ID_KEY: &str = "doc_id";
const METADATA_KEY: &str = "metadata";

/// A [`VectorStore`] backed by one [Qdrant](https://qdrant.tech/) collection.
///
/// Qdrant point ids must be integers or UUIDs, so document ids are mapped to
/// deterministic UUIDv5 values and the original id is kept in the payload.
/// Vectors are not returned by queries.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    ready: OnceCell<()>,
}

impl QdrantVectorStore {
    /// Create a store for `collection` on the Qdrant server at `url`.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self::from_client(client, collection))
    }

    /// Create a store from an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>) -> Self {
        Self { client, collection: collection.into(), ready: OnceCell::new() }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::store(BACKEND, e.to_string())
    }

    /// Deterministic point id for a document id.
    pub fn point_id(document_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let exists =
                    self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
                if exists {
                    debug!(collection = %self.collection, "qdrant collection already exists");
                    return Ok(());
                }
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&self.collection).vectors_config(
                            VectorParamsBuilder::new(dimensions as u64, Distance::Cosine),
                        ),
                    )
                    .await
                    .map_err(Self::map_err)?;
                debug!(collection = %self.collection, dimensions, "created qdrant collection");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn payload_for(document: &Document) -> Result<Payload> {
        let metadata: serde_json::Map<String, serde_json::Value> = document
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let payload = serde_json::json!({
            TEXT_KEY: document.text,
            ID_KEY: document.id,
            METADATA_KEY: metadata,
        });
        Payload::try_from(payload).map_err(Self::map_err)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn insert(&self, document: Document) -> Result<()> {
        if document.vector.is_empty() {
            return Err(RagError::Validation(format!(
                "document '{}' has an empty vector",
                document.id
            )));
        }
        self.ensure_collection(document.vector.len()).await?;

        let payload = Self::payload_for(&document)?;
        let point = PointStruct::new(Self::point_id(&document.id), document.vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, document.id = %document.id, "upserted to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        validate_query(vector, top_k, threshold)?;

        let exists =
            self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
        if !exists {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .with_payload(true)
                    .score_threshold(threshold),
            )
            .await
            .map_err(Self::map_err)?;

        let matches = response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored
                    .payload
                    .get(ID_KEY)
                    .and_then(Self::extract_string)
                    .unwrap_or_default();
                let text =
                    scored.payload.get(TEXT_KEY).and_then(Self::extract_string).unwrap_or_default();
                let metadata: HashMap<String, String> = scored
                    .payload
                    .get(METADATA_KEY)
                    .and_then(|v| match &v.kind {
                        Some(Kind::StructValue(s)) => Some(
                            s.fields
                                .iter()
                                .filter_map(|(k, v)| {
                                    Self::extract_string(v).map(|s| (k.clone(), s))
                                })
                                .collect(),
                        ),
                        _ => None,
                    })
                    .unwrap_or_default();

                ScoredDocument {
                    document: Document { id, text, vector: Vec::new(), metadata },
                    similarity: scored.score,
                }
            })
            .collect();

        Ok(apply_threshold(matches, top_k, threshold))
    }

    fn backend(&self) -> &str {
        BACKEND
    }

    fn namespace(&self) -> &str {
        &self.collection
    }
}
