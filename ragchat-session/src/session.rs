//! The chat session state machine.
//!
//! One [`ChatSession`] drives one conversation: optional ingestion, query
//! embedding, vector search, prompt assembly, generation and history update,
//! always in that order.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_session::{ChatRequest, ChatSession, ConversationState, Generator, SessionServices};
//!
//! let services = SessionServices::new(retrieval, Generator::Local(model));
//! let mut session = ChatSession::new("session-1", ConversationState::local(), services)?;
//! let reply = session.respond(ChatRequest::new("How did Zomato shares do?")).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use ragchat_model::{ChatMessage, ChatModel, ModelError, ThreadedChatModel};
use ragchat_retrieval::{IngestionPipeline, RetrievalPipeline};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{Result, SessionError};
use crate::phase::{PhaseHandle, SessionPhase};
use crate::prompt::ContextBuilder;
use crate::state::{ConversationMode, ConversationState};

/// Default upper bound for one generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// The generation provider of a session, matching its [`ConversationMode`].
#[derive(Clone)]
pub enum Generator {
    /// Stateless completions over locally kept history.
    Local(Arc<dyn ChatModel>),
    /// Provider-side threads.
    Remote(Arc<dyn ThreadedChatModel>),
}

impl Generator {
    pub fn mode(&self) -> ConversationMode {
        match self {
            Self::Local(_) => ConversationMode::History,
            Self::Remote(_) => ConversationMode::Thread,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Local(model) => model.name(),
            Self::Remote(model) => model.name(),
        }
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Generator").field(&self.mode()).field(&self.name()).finish()
    }
}

/// The components every session of a process shares.
#[derive(Clone)]
pub struct SessionServices {
    pub retrieval: Arc<RetrievalPipeline>,
    pub ingestion: Option<Arc<IngestionPipeline>>,
    pub generator: Generator,
    pub prompt: ContextBuilder,
    pub generation_timeout: Duration,
}

impl SessionServices {
    /// Services without request-time ingestion, with the default prompt and timeout.
    pub fn new(retrieval: Arc<RetrievalPipeline>, generator: Generator) -> Self {
        Self {
            retrieval,
            ingestion: None,
            generator,
            prompt: ContextBuilder::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_ingestion(mut self, ingestion: Arc<IngestionPipeline>) -> Self {
        self.ingestion = Some(ingestion);
        self
    }

    pub fn with_prompt(mut self, prompt: ContextBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

/// One user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    /// Sources to ingest before answering; failures are logged, not fatal.
    pub sources: Vec<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), sources: Vec::new() }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }
}

/// A single conversation and its request state machine.
///
/// `respond` takes `&mut self`, so one session can only serve one request at
/// a time; callers sharing a session put it behind a mutex (see
/// [`SessionManager`](crate::SessionManager)).
pub struct ChatSession {
    id: String,
    state: ConversationState,
    services: SessionServices,
    phase: PhaseHandle,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("generator", &self.services.generator)
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl ChatSession {
    /// Create a session over `state`.
    ///
    /// # Errors
    ///
    /// [`SessionError::ModeMismatch`] if `state` and the generator disagree
    /// on where history is kept.
    pub fn new(
        id: impl Into<String>,
        state: ConversationState,
        services: SessionServices,
    ) -> Result<Self> {
        let id = id.into();
        if state.mode() != services.generator.mode() {
            return Err(SessionError::ModeMismatch { session_id: id });
        }
        Ok(Self { id, state, services, phase: PhaseHandle::default() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    /// A handle that observes this session's phase without locking it.
    pub fn phase_handle(&self) -> PhaseHandle {
        self.phase.clone()
    }

    /// Answer `request`.
    ///
    /// On success the templated user prompt and the reply are appended to
    /// local history. On any error the history is unchanged and the session
    /// is back in [`SessionPhase::Idle`].
    pub async fn respond(&mut self, request: ChatRequest) -> Result<String> {
        let span = info_span!("chat_session.respond", session.id = %self.id);
        self.respond_inner(request).instrument(span).await
    }

    async fn respond_inner(&mut self, request: ChatRequest) -> Result<String> {
        let query = request.message.trim();
        if query.is_empty() {
            return Err(SessionError::Validation("Message is required".to_string()));
        }

        let phase = self.phase.clone();
        let guard = phase.enter(SessionPhase::AwaitingEmbedding);

        if !request.sources.is_empty() {
            self.ingest(&request.sources).await;
        }

        let retrieval = &self.services.retrieval;
        let vector = retrieval.embed_query(query).await?;

        guard.advance(SessionPhase::AwaitingRetrieval);
        let config = retrieval.config();
        let retrieved =
            retrieval.search(&vector, config.top_k, config.similarity_threshold).await?;
        debug!(
            result_count = retrieved.len(),
            top_similarity = retrieved.first().map(|r| r.similarity),
            "context retrieved"
        );

        let messages = self.services.prompt.build_prompt(query, &retrieved, &self.state);

        guard.advance(SessionPhase::AwaitingGeneration);
        let reply = self.generate(&messages).await?;

        if let ConversationState::Local { turns } = &mut self.state {
            if let Some(prompt) = messages.last() {
                turns.push(prompt.clone());
            }
            turns.push(ChatMessage::assistant(&reply));
        }

        info!(
            generator = self.services.generator.name(),
            context_documents = retrieved.len(),
            reply_len = reply.len(),
            "request completed"
        );
        Ok(reply)
    }

    async fn ingest(&self, sources: &[String]) {
        let Some(ingestion) = &self.services.ingestion else {
            warn!(source_count = sources.len(), "request sources ignored, no ingestion pipeline");
            return;
        };
        let report = ingestion.ingest_batch(sources).await;
        if report.failed() > 0 {
            warn!(
                stored = report.stored(),
                failed = report.failed(),
                "some request sources were not ingested"
            );
        }
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let timeout = self.services.generation_timeout;
        let generator = &self.services.generator;

        let call = async {
            match (generator, &self.state) {
                (Generator::Local(model), ConversationState::Local { .. }) => {
                    model.complete(messages).await
                }
                (Generator::Remote(model), ConversationState::Remote { thread_id }) => {
                    let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
                    model.send(thread_id, prompt).await
                }
                _ => Err(ModelError::Config("conversation mode does not match generator".into())),
            }
        };

        let reply = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::unavailable(
                generator.name(),
                format!("no response within {timeout:?}"),
            )),
        };

        reply.map_err(|e| {
            error!(generator = generator.name(), error = %e, "generation failed");
            SessionError::Generation(e)
        })
    }
}
