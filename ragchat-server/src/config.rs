//! Server configuration from environment variables.

use std::str::FromStr;

use anyhow::{Context, bail};
use ragchat_model::openai::{DEFAULT_CHAT_MODEL, OPENAI_API_BASE};
use ragchat_retrieval::RagConfig;
use ragchat_retrieval::openai::DEFAULT_EMBEDDING_MODEL;
use ragchat_session::{ConversationMode, DEFAULT_SESSION_CAPACITY, DEFAULT_SYSTEM_INSTRUCTION};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_PINECONE_NAMESPACE: &str = "ns1";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_QDRANT_COLLECTION: &str = "rag-demo-index";

/// Which [`VectorStore`](ragchat_retrieval::VectorStore) backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorBackend {
    #[default]
    Memory,
    Pinecone,
    Qdrant,
}

impl FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "local" => Ok(Self::Memory),
            "pinecone" => Ok(Self::Pinecone),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(format!("unknown vector backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PineconeSettings {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
}

/// Everything the server binary needs to wire itself.
///
/// | Variable | Default |
/// |----------|---------|
/// | `RAGCHAT_HOST` / `RAGCHAT_PORT` | `127.0.0.1` / `5000` |
/// | `OPENAI_API_KEY` | required by the OpenAI providers |
/// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
/// | `EMBEDDING_MODEL` | `text-embedding-ada-002` |
/// | `CHAT_MODEL` | `gpt-4o-mini` |
/// | `SYSTEM_INSTRUCTION` | `You are a helpful assistant.` |
/// | `VECTOR_BACKEND` | `memory` (`pinecone`, `qdrant`) |
/// | `VECTOR_CAPACITY` | unbounded in-memory index |
/// | `PINECONE_HOST`, `PINECONE_API_KEY` (or `PINE_CONE_API_KEY`) | none |
/// | `PINECONE_NAMESPACE` | `ns1` |
/// | `QDRANT_URL` / `QDRANT_COLLECTION` | `http://localhost:6334` / `rag-demo-index` |
/// | `CONVERSATION_MODE` | `history` (`thread`) |
/// | `OPENAI_ASSISTANT_ID` | required in thread mode |
/// | `SESSION_CAPACITY` | `1024` live sessions, least recently used evicted first |
/// | `INGEST_URLS` | none, comma-separated |
///
/// Retrieval tuning (`RAG_*`) is read by [`RagConfig::from_lookup`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub system_instruction: String,
    pub vector_backend: VectorBackend,
    pub vector_capacity: Option<usize>,
    pub pinecone: PineconeSettings,
    pub qdrant: QdrantSettings,
    pub conversation_mode: ConversationMode,
    pub assistant_id: Option<String>,
    pub session_capacity: usize,
    pub ingest_urls: Vec<String>,
    pub rag: RagConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            openai_api_key: None,
            openai_base_url: OPENAI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            vector_backend: VectorBackend::Memory,
            vector_capacity: None,
            pinecone: PineconeSettings {
                namespace: DEFAULT_PINECONE_NAMESPACE.to_string(),
                ..PineconeSettings::default()
            },
            qdrant: QdrantSettings {
                url: DEFAULT_QDRANT_URL.to_string(),
                collection: DEFAULT_QDRANT_COLLECTION.to_string(),
            },
            conversation_mode: ConversationMode::History,
            assistant_id: None,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            ingest_urls: Vec::new(),
            rag: RagConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("RAGCHAT_PORT") {
            Some(raw) => {
                raw.parse::<u16>().with_context(|| format!("RAGCHAT_PORT={raw:?} is invalid"))?
            }
            None => defaults.port,
        };
        let vector_backend = match get("VECTOR_BACKEND") {
            Some(raw) => raw.parse::<VectorBackend>().map_err(anyhow::Error::msg)?,
            None => defaults.vector_backend,
        };
        let vector_capacity = get("VECTOR_CAPACITY")
            .map(|raw| positive("VECTOR_CAPACITY", &raw))
            .transpose()?;
        let session_capacity = match get("SESSION_CAPACITY") {
            Some(raw) => positive("SESSION_CAPACITY", &raw)?,
            None => defaults.session_capacity,
        };
        let conversation_mode = match get("CONVERSATION_MODE") {
            Some(raw) => raw.parse::<ConversationMode>().map_err(anyhow::Error::msg)?,
            None => defaults.conversation_mode,
        };
        let ingest_urls = get("INGEST_URLS")
            .map(|raw| {
                raw.split(',').map(str::trim).filter(|u| !u.is_empty()).map(String::from).collect()
            })
            .unwrap_or_default();
        let rag = RagConfig::from_lookup(&lookup).context("invalid retrieval configuration")?;

        Ok(Self {
            host: get("RAGCHAT_HOST").unwrap_or(defaults.host),
            port,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            chat_model: get("CHAT_MODEL").unwrap_or(defaults.chat_model),
            system_instruction: get("SYSTEM_INSTRUCTION").unwrap_or(defaults.system_instruction),
            vector_backend,
            vector_capacity,
            pinecone: PineconeSettings {
                host: get("PINECONE_HOST"),
                api_key: get("PINECONE_API_KEY").or_else(|| get("PINE_CONE_API_KEY")),
                namespace: get("PINECONE_NAMESPACE").unwrap_or(defaults.pinecone.namespace),
            },
            qdrant: QdrantSettings {
                url: get("QDRANT_URL").unwrap_or(defaults.qdrant.url),
                collection: get("QDRANT_COLLECTION").unwrap_or(defaults.qdrant.collection),
            },
            conversation_mode,
            assistant_id: get("OPENAI_ASSISTANT_ID"),
            session_capacity,
            ingest_urls,
            rag,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn positive(key: &str, raw: &str) -> anyhow::Result<usize> {
    let value: usize = raw.parse().with_context(|| format!("{key}={raw:?} is invalid"))?;
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_reference_deployment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.address(), "127.0.0.1:5000");
        assert_eq!(config.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.vector_backend, VectorBackend::Memory);
        assert_eq!(config.pinecone.namespace, "ns1");
        assert_eq!(config.conversation_mode, ConversationMode::History);
        assert_eq!(config.rag.top_k, 3);
        assert!(config.ingest_urls.is_empty());
        assert_eq!(config.session_capacity, DEFAULT_SESSION_CAPACITY);
    }

    #[test]
    fn reads_every_override() {
        let config = config(&[
            ("RAGCHAT_PORT", "8080"),
            ("VECTOR_BACKEND", "Pinecone"),
            ("PINE_CONE_API_KEY", "pc-legacy"),
            ("PINECONE_HOST", "index.svc.pinecone.io"),
            ("CONVERSATION_MODE", "thread"),
            ("OPENAI_ASSISTANT_ID", "asst_1"),
            ("INGEST_URLS", "https://a.example, ,https://b.example"),
            ("RAG_TOP_K", "5"),
            ("VECTOR_CAPACITY", "100"),
            ("SESSION_CAPACITY", "16"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.vector_backend, VectorBackend::Pinecone);
        assert_eq!(config.pinecone.api_key.as_deref(), Some("pc-legacy"));
        assert_eq!(config.conversation_mode, ConversationMode::Thread);
        assert_eq!(config.assistant_id.as_deref(), Some("asst_1"));
        assert_eq!(config.ingest_urls, ["https://a.example", "https://b.example"]);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.vector_capacity, Some(100));
        assert_eq!(config.session_capacity, 16);
    }

    #[test]
    fn new_pinecone_key_wins_over_legacy() {
        let config =
            config(&[("PINECONE_API_KEY", "pc-new"), ("PINE_CONE_API_KEY", "pc-legacy")]).unwrap();
        assert_eq!(config.pinecone.api_key.as_deref(), Some("pc-new"));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("RAGCHAT_PORT", "eighty")]).is_err());
        assert!(config(&[("VECTOR_BACKEND", "faiss")]).is_err());
        assert!(config(&[("VECTOR_CAPACITY", "0")]).is_err());
        assert!(config(&[("SESSION_CAPACITY", "0")]).is_err());
        assert!(config(&[("SESSION_CAPACITY", "many")]).is_err());
        assert!(config(&[("CONVERSATION_MODE", "both")]).is_err());
        assert!(config(&[("RAG_SIMILARITY_THRESHOLD", "high")]).is_err());
    }
}
