//! Generation-provider seams.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ChatMessage;

/// A stateless chat-completion model.
///
/// The caller owns the conversation and sends the full message list on every
/// call. Implementations report every failure as
/// [`ModelError::GenerationUnavailable`](crate::ModelError::GenerationUnavailable)
/// and do not retry.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the assistant reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model name used in logs and errors.
    fn name(&self) -> &str;
}

/// A model that keeps the conversation on the provider side, in a thread
/// addressed by an opaque id.
#[async_trait]
pub trait ThreadedChatModel: Send + Sync {
    /// Create a new, empty thread and return its id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user message to `thread_id`, run the model on the thread and
    /// return the assistant reply.
    async fn send(&self, thread_id: &str, content: &str) -> Result<String>;

    /// Model or assistant name used in logs and errors.
    fn name(&self) -> &str;
}
