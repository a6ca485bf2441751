//! Builds the provider, store and pipeline graph described by a [`ServerConfig`].

use std::sync::Arc;

use anyhow::{Context, bail};
use ragchat_model::openai::{
    AssistantConfig, OpenAIAssistantModel, OpenAIChatModel, OpenAIConfig,
};
use ragchat_retrieval::openai::OpenAIEmbeddingProvider;
use ragchat_retrieval::pinecone::PineconeVectorStore;
use ragchat_retrieval::qdrant::QdrantVectorStore;
use ragchat_retrieval::{
    EmbeddingProvider, InMemoryVectorStore, IngestionPipeline, RetrievalPipeline, VectorStore,
    WebTextSource,
};
use ragchat_session::{
    ContextBuilder, ConversationMode, Generator, SessionManager, SessionServices,
};
use ragchat_telemetry::SharedTraceStorage;
use tracing::info;

use crate::config::{ServerConfig, VectorBackend};
use crate::server::AppState;

fn openai_key(config: &ServerConfig) -> anyhow::Result<&str> {
    match config.openai_api_key.as_deref() {
        Some(key) => Ok(key),
        None => bail!("OPENAI_API_KEY must be set"),
    }
}

pub fn embedding_provider(config: &ServerConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider = OpenAIEmbeddingProvider::new(openai_key(config)?)?
        .with_base_url(&config.openai_base_url)
        .with_model(&config.embedding_model);
    Ok(Arc::new(provider))
}

pub fn vector_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_backend {
        VectorBackend::Memory => {
            let store = InMemoryVectorStore::new();
            Arc::new(match config.vector_capacity {
                Some(capacity) => store.with_capacity(capacity),
                None => store,
            })
        }
        VectorBackend::Pinecone => {
            let settings = &config.pinecone;
            let host = settings.host.as_deref().context("PINECONE_HOST must be set")?;
            let key = settings.api_key.as_deref().context("PINECONE_API_KEY must be set")?;
            Arc::new(PineconeVectorStore::new(host, key, &settings.namespace)?)
        }
        VectorBackend::Qdrant => {
            Arc::new(QdrantVectorStore::new(&config.qdrant.url, &config.qdrant.collection)?)
        }
    };
    Ok(store)
}

pub fn generator(config: &ServerConfig) -> anyhow::Result<Generator> {
    let openai = OpenAIConfig::compatible(
        openai_key(config)?,
        &config.openai_base_url,
        &config.chat_model,
    );
    let generator = match config.conversation_mode {
        ConversationMode::History => Generator::Local(Arc::new(OpenAIChatModel::new(openai)?)),
        ConversationMode::Thread => {
            let assistant_id = config
                .assistant_id
                .as_deref()
                .context("OPENAI_ASSISTANT_ID must be set in thread mode")?;
            let model = OpenAIAssistantModel::new(openai, AssistantConfig::new(assistant_id))?;
            Generator::Remote(Arc::new(model))
        }
    };
    Ok(generator)
}

/// Wire pipelines and sessions around already constructed components.
pub fn assemble(
    config: &ServerConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Generator,
) -> anyhow::Result<AppState> {
    let ingestion = IngestionPipeline::builder()
        .config(config.rag.clone())
        .embedding_provider(provider.clone())
        .vector_store(store.clone())
        .text_source(Arc::new(WebTextSource::new()))
        .build()?;
    let retrieval = RetrievalPipeline::builder()
        .config(config.rag.clone())
        .embedding_provider(provider)
        .vector_store(store)
        .build()?;

    let ingestion = Arc::new(ingestion);
    let services = SessionServices::new(Arc::new(retrieval), generator)
        .with_ingestion(ingestion.clone())
        .with_prompt(ContextBuilder::new().with_system_instruction(&config.system_instruction));
    let sessions = SessionManager::new(services).with_capacity(config.session_capacity);
    Ok(AppState::new(sessions, ingestion))
}

/// Build the full application state from `config`.
pub fn build_state(
    config: &ServerConfig,
    traces: Option<Arc<SharedTraceStorage>>,
) -> anyhow::Result<AppState> {
    let provider = embedding_provider(config).context("embedding provider")?;
    let store = vector_store(config).context("vector store")?;
    let generator = generator(config).context("generation provider")?;
    info!(
        backend = store.backend(),
        namespace = %store.namespace(),
        generator = generator.name(),
        mode = config.conversation_mode.as_str(),
        "components wired"
    );

    let state = assemble(config, provider, store, generator)?;
    Ok(match traces {
        Some(traces) => state.with_traces(traces),
        None => state,
    })
}
