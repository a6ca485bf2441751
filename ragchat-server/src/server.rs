use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use ragchat_retrieval::{IngestSummary, IngestionPipeline};
use ragchat_session::{ChatRequest, SessionManager};
use ragchat_telemetry::{SharedTraceStorage, SpanData};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::protocol::{ChatRequestBody, ChatResponseBody, HealthResponse, IngestRequestBody};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub ingestion: Arc<IngestionPipeline>,
    pub traces: Option<Arc<SharedTraceStorage>>,
}

impl AppState {
    pub fn new(sessions: SessionManager, ingestion: Arc<IngestionPipeline>) -> Self {
        Self { sessions, ingestion, traces: None }
    }

    /// Serve captured spans; a session's trace is dropped when it is evicted.
    pub fn with_traces(mut self, traces: Arc<SharedTraceStorage>) -> Self {
        let storage = traces.clone();
        self.sessions = self.sessions.with_eviction_listener(move |id| {
            storage.remove(id);
        });
        self.traces = Some(traces);
        self
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/ingest", post(ingest))
        .route("/debug/trace/{thread_id}", get(trace))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr =
        addr.parse().with_context(|| format!("invalid listen address {addr:?}"))?;
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "ragchat listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.ingestion.vector_store();
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ragchat".to_string(),
        backend: store.backend().to_string(),
        namespace: store.namespace().to_string(),
        mode: state.sessions.mode().as_str().to_string(),
        sessions: state.sessions.len().await,
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let message = body.user_message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }
    debug!(
        thread_id = body.thread_id.as_deref(),
        message_len = message.len(),
        source_count = body.sources.len(),
        "chat request"
    );

    let request = ChatRequest::new(message).with_sources(body.sources);
    let reply = state.sessions.respond(body.thread_id.as_deref(), request).await?;
    Ok(Json(ChatResponseBody { assistant_reply: reply.reply, thread_id: reply.thread_id }))
}

async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestRequestBody>,
) -> Json<IngestSummary> {
    let report = state.ingestion.ingest_batch(&body.sources).await;
    Json(report.summary())
}

async fn trace(
    Path(thread_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SpanData>>, ApiError> {
    state
        .traces
        .as_ref()
        .and_then(|traces| traces.get_trace(&thread_id))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no trace for thread {thread_id}")))
}
