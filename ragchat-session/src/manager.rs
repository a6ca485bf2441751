//! Process-wide registry of chat sessions keyed by thread id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::phase::{PhaseHandle, SessionPhase};
use crate::session::{ChatRequest, ChatSession, Generator, SessionServices};
use crate::state::{ConversationMode, ConversationState};

/// The answer to one request, with the thread id the client should send next time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub thread_id: String,
    pub reply: String,
}

/// Sessions kept unless configured otherwise.
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

/// Longest accepted thread id.
pub const MAX_THREAD_ID_LEN: usize = 128;

type EvictionListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
struct SessionEntry {
    id: String,
    session: Arc<Mutex<ChatSession>>,
    phase: PhaseHandle,
    last_used: Arc<AtomicU64>,
}

/// Owns every live [`ChatSession`].
///
/// Sessions are created on first use. A request for a session that is still
/// answering an earlier request fails fast with [`SessionError::Busy`] instead
/// of queueing behind it. Once `capacity` sessions exist, creating another
/// evicts the least recently used idle session.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    services: SessionServices,
    capacity: usize,
    clock: Arc<AtomicU64>,
    on_evict: Option<EvictionListener>,
}

impl SessionManager {
    pub fn new(services: SessionServices) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            services,
            capacity: DEFAULT_SESSION_CAPACITY,
            clock: Arc::new(AtomicU64::new(0)),
            on_evict: None,
        }
    }

    /// Keep at most `capacity` sessions. A capacity of zero is treated as one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Call `listener` with the id of every evicted session.
    pub fn with_eviction_listener(
        mut self,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Arc::new(listener));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> ConversationMode {
        self.services.generator.mode()
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Start a new conversation and return its id.
    ///
    /// In thread mode the id is the provider's thread id.
    pub async fn create_session(&self) -> Result<String> {
        let state = match &self.services.generator {
            Generator::Local(_) => ConversationState::local(),
            Generator::Remote(model) => ConversationState::remote(model.create_thread().await?),
        };
        let id = state.thread_id().map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        self.insert(&id, state).await?;
        Ok(id)
    }

    /// Answer `request` in the session `thread_id`, creating it if needed.
    ///
    /// A blank message or a malformed id is rejected before any session is
    /// created. Without an id a new session is started. An unknown id starts a
    /// session under that id; in thread mode the id is taken to be an
    /// existing provider thread.
    pub async fn respond(
        &self,
        thread_id: Option<&str>,
        request: ChatRequest,
    ) -> Result<ChatReply> {
        if request.message.trim().is_empty() {
            return Err(SessionError::Validation("Message is required".to_string()));
        }
        let entry = match thread_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                validate_thread_id(id)?;
                self.ensure_session(id).await?
            }
            None => {
                let id = self.create_session().await?;
                self.ensure_session(&id).await?
            }
        };

        entry.last_used.store(self.tick(), Ordering::Relaxed);
        let mut session = entry.session.try_lock_owned().map_err(|_| {
            debug!(session.id = %entry.id, "rejecting request for busy session");
            SessionError::Busy { session_id: entry.id.clone() }
        })?;

        let reply = session.respond(request).await?;
        Ok(ChatReply { thread_id: session.id().to_string(), reply })
    }

    /// The current phase of `thread_id`, if the session exists.
    pub async fn phase(&self, thread_id: &str) -> Option<SessionPhase> {
        self.sessions.read().await.get(thread_id).map(|entry| entry.phase.get())
    }

    /// A snapshot of the conversation state of `thread_id`.
    ///
    /// Waits for an in-flight request on that session to finish.
    pub async fn state(&self, thread_id: &str) -> Option<ConversationState> {
        let entry = self.sessions.read().await.get(thread_id).cloned()?;
        let session = entry.session.lock().await;
        Some(session.state().clone())
    }

    pub async fn contains(&self, thread_id: &str) -> bool {
        self.sessions.read().await.contains_key(thread_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Forget `thread_id`. A request still running on it finishes normally.
    pub async fn remove(&self, thread_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(thread_id).is_some();
        if removed {
            self.notify_evicted(thread_id);
        }
        removed
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn notify_evicted(&self, id: &str) {
        if let Some(listener) = &self.on_evict {
            listener(id);
        }
    }

    async fn ensure_session(&self, id: &str) -> Result<SessionEntry> {
        if let Some(entry) = self.sessions.read().await.get(id) {
            return Ok(entry.clone());
        }
        let state = match self.mode() {
            ConversationMode::History => ConversationState::local(),
            ConversationMode::Thread => ConversationState::remote(id),
        };
        self.insert(id, state).await
    }

    async fn insert(&self, id: &str, state: ConversationState) -> Result<SessionEntry> {
        let session = ChatSession::new(id, state, self.services.clone())?;
        let mut evicted = Vec::new();
        let entry = {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains_key(id) {
                while sessions.len() >= self.capacity {
                    // Sessions answering a request are never evicted.
                    let Some(victim) = sessions
                        .values()
                        .filter(|entry| entry.session.try_lock().is_ok())
                        .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                        .map(|entry| entry.id.clone())
                    else {
                        warn!(capacity = self.capacity, "all sessions busy, exceeding capacity");
                        break;
                    };
                    sessions.remove(&victim);
                    evicted.push(victim);
                }
            }
            sessions
                .entry(id.to_string())
                .or_insert_with(|| {
                    let mode = self.services.generator.mode();
                    info!(session.id = %id, ?mode, "session created");
                    SessionEntry {
                        id: id.to_string(),
                        phase: session.phase_handle(),
                        session: Arc::new(Mutex::new(session)),
                        last_used: Arc::new(AtomicU64::new(self.tick())),
                    }
                })
                .clone()
        };
        for id in &evicted {
            info!(session.id = %id, capacity = self.capacity, "evicted idle session");
            self.notify_evicted(id);
        }
        Ok(entry)
    }
}

/// Accept ids made of ASCII letters, digits, `_` and `-` only.
///
/// Ids are echoed to clients, used as trace keys and, in thread mode, sent to
/// the provider as a path segment.
pub fn validate_thread_id(id: &str) -> Result<()> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_THREAD_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if well_formed {
        Ok(())
    } else {
        debug!(thread_id.len = id.len(), "rejecting malformed thread id");
        Err(SessionError::Validation("Invalid thread id".to_string()))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("generator", &self.services.generator)
            .field("capacity", &self.capacity)
            .finish()
    }
}
