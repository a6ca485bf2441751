//! Scripted generation providers for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ModelError, Result};
use crate::message::{ChatMessage, Role};
use crate::model::{ChatModel, ThreadedChatModel};

const PROVIDER: &str = "mock";

#[derive(Debug, Default)]
struct ChatState {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

/// A [`ChatModel`] that replays scripted replies.
///
/// Queued replies ([`with_reply`](Self::with_reply),
/// [`with_failure`](Self::with_failure)) are consumed in order; once the
/// queue is empty every call echoes the last user message. Every prompt is
/// recorded and can be inspected with [`prompts`](Self::prompts). Clones
/// share their state.
#[derive(Debug, Clone, Default)]
pub struct MockChatModel {
    delay: Option<Duration>,
    state: Arc<ChatState>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.state.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.state.replies.lock() {
            replies.push_back(Err(ModelError::unavailable(PROVIDER, message)));
        }
        self
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every message list passed to [`ChatModel::complete`] so far.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.state.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn echo(messages: &[ChatMessage]) -> String {
    let last_user = messages.iter().rev().find(|m| m.role == Role::User);
    format!("echo: {}", last_user.map(|m| m.content.as_str()).unwrap_or_default())
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Ok(mut prompts) = self.state.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.state.replies.lock().ok().and_then(|mut r| r.pop_front());
        scripted.unwrap_or_else(|| Ok(echo(messages)))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    threads: Mutex<HashMap<String, Vec<String>>>,
    replies: Mutex<VecDeque<Result<String>>>,
    created: AtomicUsize,
}

/// A [`ThreadedChatModel`] that keeps threads in memory.
///
/// Thread ids are `thread_mock_{n}`. Sent messages are recorded per thread,
/// but only when the reply succeeds. Replies follow the same queue-then-echo
/// rule as [`MockChatModel`].
#[derive(Debug, Clone, Default)]
pub struct MockThreadedModel {
    state: Arc<ThreadState>,
}

impl MockThreadedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.state.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.state.replies.lock() {
            replies.push_back(Err(ModelError::unavailable(PROVIDER, message)));
        }
        self
    }

    /// User messages recorded on `thread_id`.
    pub fn messages(&self, thread_id: &str) -> Vec<String> {
        self.state
            .threads
            .lock()
            .ok()
            .and_then(|t| t.get(thread_id).cloned())
            .unwrap_or_default()
    }

    /// Number of threads created so far.
    pub fn thread_count(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreadedChatModel for MockThreadedModel {
    async fn create_thread(&self) -> Result<String> {
        let n = self.state.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("thread_mock_{n}");
        if let Ok(mut threads) = self.state.threads.lock() {
            threads.insert(id.clone(), Vec::new());
        }
        Ok(id)
    }

    async fn send(&self, thread_id: &str, content: &str) -> Result<String> {
        let known = self.state.threads.lock().map(|t| t.contains_key(thread_id)).unwrap_or(false);
        if !known {
            return Err(ModelError::unavailable(PROVIDER, format!("no thread {thread_id}")));
        }
        let scripted = self.state.replies.lock().ok().and_then(|mut r| r.pop_front());
        let reply = scripted.unwrap_or_else(|| Ok(format!("echo: {content}")))?;
        if let Ok(mut threads) = self.state.threads.lock() {
            threads.entry(thread_id.to_string()).or_default().push(content.to_string());
        }
        Ok(reply)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
