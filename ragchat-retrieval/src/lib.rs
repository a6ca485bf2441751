//! # ragchat-retrieval
//!
//! The retrieval core of ragchat: document ingestion into a vector index and
//! nearest-neighbour retrieval at query time.
//!
//! ## Overview
//!
//! - [`cosine_similarity`] - similarity of two equal-length vectors
//! - [`Embedder`] - validating, time-bounded wrapper around an [`EmbeddingProvider`]
//! - [`VectorStore`] - namespace-scoped upsert/query contract, implemented by
//!   [`InMemoryVectorStore`] and the remote backends
//! - [`IngestionPipeline`] - source → text → truncate → embed → store, batched
//! - [`RetrievalPipeline`] - query → embed → top-K search → threshold
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchat_retrieval::*;
//!
//! let provider = Arc::new(MockEmbeddingProvider::new(64));
//! let store = Arc::new(InMemoryVectorStore::new());
//!
//! let ingestion = IngestionPipeline::builder()
//!     .embedding_provider(provider.clone())
//!     .vector_store(store.clone())
//!     .build()?;
//! ingestion.ingest("Zomato share price rose 5%", "doc_a").await?;
//!
//! let retrieval = RetrievalPipeline::builder()
//!     .embedding_provider(provider)
//!     .vector_store(store)
//!     .build()?;
//! let hits = retrieval.retrieve_default("Zomato share price").await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `openai` | [`OpenAIEmbeddingProvider`](openai::OpenAIEmbeddingProvider) |
//! | `pinecone` | [`PineconeVectorStore`](pinecone::PineconeVectorStore) |
//! | `qdrant` | [`QdrantVectorStore`](qdrant::QdrantVectorStore) |
//! | `fetch` | [`WebTextSource`] for downloading and cleaning web pages |

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod ingestion;
pub mod math;
pub mod mock;
pub mod resilience;
pub mod retrieval;
pub mod source;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use config::{CHARS_PER_TOKEN, RagConfig, RagConfigBuilder};
pub use document::{Document, ScoredDocument};
pub use embedding::{Embedder, EmbeddingProvider};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use ingestion::{
    IngestItem, IngestOutcome, IngestReport, IngestSummary, IngestionPipeline,
    IngestionPipelineBuilder, SOURCE_METADATA_KEY, truncate,
};
pub use math::cosine_similarity;
pub use mock::MockEmbeddingProvider;
pub use resilience::RetryPolicy;
pub use retrieval::{RetrievalPipeline, RetrievalPipelineBuilder};
pub use source::{RawTextSource, TextSource};
#[cfg(feature = "fetch")]
pub use source::{WebTextSource, html_to_text};
pub use vectorstore::VectorStore;

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
#[cfg(feature = "pinecone")]
pub use pinecone::PineconeVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
