//! # ragchat-session
//!
//! Conversation handling for ragchat: per-session history, prompt assembly
//! from retrieved context, and the request state machine
//!
//! `Idle → AwaitingEmbedding → AwaitingRetrieval → AwaitingGeneration → Idle`
//!
//! A failed request leaves the session idle with its history unchanged.
//!
//! - [`ContextBuilder`] - fills the prompt template from retrieved documents
//! - [`ChatSession`] - one conversation, local history or a remote thread
//! - [`SessionManager`] - sessions keyed by thread id, created on demand

pub mod error;
pub mod manager;
pub mod phase;
pub mod prompt;
pub mod session;
pub mod state;

pub use error::{Result, SessionError};
pub use manager::{
    ChatReply, DEFAULT_SESSION_CAPACITY, MAX_THREAD_ID_LEN, SessionManager, validate_thread_id,
};
pub use phase::{PhaseHandle, SessionPhase};
pub use prompt::{ContextBuilder, ContextSelection, DEFAULT_SYSTEM_INSTRUCTION, NO_CONTEXT};
pub use session::{
    ChatRequest, ChatSession, DEFAULT_GENERATION_TIMEOUT, Generator, SessionServices,
};
pub use state::{ConversationMode, ConversationState};
