//! Server-side conversation threads through the OpenAI assistants v2 API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::config::OpenAIConfig;
use super::{PROVIDER, error_detail};
use crate::error::{ModelError, Result};
use crate::model::ThreadedChatModel;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Settings for an [`OpenAIAssistantModel`].
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// The pre-configured assistant that runs on every thread.
    pub assistant_id: String,
    /// Delay between run status checks.
    pub poll_interval: Duration,
    /// Give up on a run that has not finished after this long.
    pub max_wait: Duration,
}

impl AssistantConfig {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// A [`ThreadedChatModel`] that keeps conversations in OpenAI threads.
///
/// Each [`send`](ThreadedChatModel::send) adds the user message to the
/// thread, starts a run of the configured assistant, polls the run until it
/// reaches a terminal status and returns the newest assistant message. Runs
/// that stop to request tool outputs are reported as failures.
#[derive(Debug, Clone)]
pub struct OpenAIAssistantModel {
    client: reqwest::Client,
    config: OpenAIConfig,
    assistant: AssistantConfig,
}

impl OpenAIAssistantModel {
    /// Create a new assistants client. `config.model` is only used for naming.
    pub fn new(config: OpenAIConfig, assistant: AssistantConfig) -> Result<Self> {
        config.validate()?;
        if assistant.assistant_id.trim().is_empty() {
            return Err(ModelError::Config("assistant id must not be empty".into()));
        }
        Ok(Self { client: reqwest::Client::new(), config, assistant })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn send_request<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<R> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, what, error = %e, "request failed");
                ModelError::unavailable(PROVIDER, format!("{what} failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, what, %status, "API error");
            return Err(ModelError::unavailable(
                PROVIDER,
                format!("{what} returned {status}: {detail}"),
            ));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, what, error = %e, "failed to parse response");
            ModelError::unavailable(PROVIDER, format!("failed to parse {what} response: {e}"))
        })
    }

    /// `base_url` followed by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            ModelError::Config(format!("invalid base URL {:?}: {e}", self.config.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| ModelError::Config("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        body: &B,
        what: &str,
    ) -> Result<R> {
        self.send_request(self.client.post(url).json(body), what).await
    }

    async fn get<R: DeserializeOwned>(&self, url: reqwest::Url, what: &str) -> Result<R> {
        self.send_request(self.client.get(url), what).await
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> Result<Run> {
        let started = Instant::now();
        while !run.is_terminal() {
            if started.elapsed() >= self.assistant.max_wait {
                warn!(
                    thread.id = thread_id,
                    run.id = %run.id,
                    status = %run.status,
                    "run timed out"
                );
                let max_wait = self.assistant.max_wait;
                return Err(ModelError::unavailable(
                    PROVIDER,
                    format!("run {} still {} after {max_wait:?}", run.id, run.status),
                ));
            }
            tokio::time::sleep(self.assistant.poll_interval).await;
            let url = self.endpoint(&["threads", thread_id, "runs", run.id.as_str()])?;
            run = self.get(url, "run status").await?;
            debug!(thread.id = thread_id, run.id = %run.id, status = %run.status, "polled run");
        }
        Ok(run)
    }
}

/// Thread ids come from clients, so they must stay a single path segment.
fn check_thread_id(thread_id: &str) -> Result<()> {
    if thread_id.trim().is_empty() {
        return Err(ModelError::Validation("thread id must not be empty".into()));
    }
    let forbidden = |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control();
    if thread_id.contains(forbidden) || thread_id.contains("..") {
        return Err(ModelError::Validation(format!("invalid thread id {thread_id:?}")));
    }
    Ok(())
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

impl Run {
    fn is_terminal(&self) -> bool {
        !matches!(self.status.as_str(), "queued" | "in_progress" | "cancelling")
    }
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    value: String,
}

impl ThreadMessage {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| part.text.as_ref().map(|t| t.value.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ThreadedChatModel for OpenAIAssistantModel {
    async fn create_thread(&self) -> Result<String> {
        let url = self.endpoint(&["threads"])?;
        let thread: Created = self.post(url, &json!({}), "create thread").await?;
        debug!(provider = PROVIDER, thread.id = %thread.id, "created thread");
        Ok(thread.id)
    }

    async fn send(&self, thread_id: &str, content: &str) -> Result<String> {
        check_thread_id(thread_id)?;
        if content.trim().is_empty() {
            return Err(ModelError::Validation("message content must not be empty".into()));
        }

        let _: Created = self
            .post(
                self.endpoint(&["threads", thread_id, "messages"])?,
                &json!({ "role": "user", "content": content }),
                "add message",
            )
            .await?;

        let run: Run = self
            .post(
                self.endpoint(&["threads", thread_id, "runs"])?,
                &json!({ "assistant_id": self.assistant.assistant_id }),
                "create run",
            )
            .await?;
        let run = self.wait_for_run(thread_id, run).await?;

        match run.status.as_str() {
            "completed" => {}
            "requires_action" => {
                error!(thread.id = thread_id, run.id = %run.id, "run requested tool outputs");
                return Err(ModelError::unavailable(
                    PROVIDER,
                    format!("run {} requires tool outputs, which are not supported", run.id),
                ));
            }
            status => {
                let reason = run.last_error.map(|e| e.message).unwrap_or_default();
                error!(
                    thread.id = thread_id,
                    run.id = %run.id,
                    status,
                    reason = %reason,
                    "run did not complete"
                );
                return Err(ModelError::unavailable(
                    PROVIDER,
                    format!("run {} ended with status {status}: {reason}", run.id),
                ));
            }
        }

        let mut url = self.endpoint(&["threads", thread_id, "messages"])?;
        url.query_pairs_mut().append_pair("order", "desc").append_pair("limit", "20");
        let messages: MessageList = self.get(url, "list messages").await?;
        let reply = messages
            .data
            .iter()
            .filter(|m| m.role == "assistant")
            .find(|m| m.run_id.as_deref() == Some(run.id.as_str()))
            .or_else(|| messages.data.iter().find(|m| m.role == "assistant"))
            .map(ThreadMessage::text)
            .filter(|text| !text.trim().is_empty());

        reply.ok_or_else(|| {
            error!(thread.id = thread_id, run.id = %run.id, "run produced no assistant message");
            let message = format!("run {} produced no assistant message", run.id);
            ModelError::unavailable(PROVIDER, message)
        })
    }

    fn name(&self) -> &str {
        &self.assistant.assistant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_statuses_are_polled() {
        let run =
            |status: &str| Run { id: "run_1".into(), status: status.into(), last_error: None };
        assert!(!run("queued").is_terminal());
        assert!(!run("in_progress").is_terminal());
        assert!(run("completed").is_terminal());
        assert!(run("requires_action").is_terminal());
        assert!(run("failed").is_terminal());
    }

    #[test]
    fn thread_ids_must_be_one_path_segment() {
        assert!(check_thread_id("thread_abc123").is_ok());
        for id in ["", "  ", "../assistants/asst_1", "thread_1?x=", "a/b", "t#frag", "t..x"] {
            assert!(
                matches!(check_thread_id(id), Err(ModelError::Validation(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn endpoints_encode_each_segment() {
        let config = OpenAIConfig::compatible("sk", "http://localhost:8080/v1/", "gpt-4o-mini");
        let model = OpenAIAssistantModel::new(config, AssistantConfig::new("asst_1")).unwrap();
        let url = model.endpoint(&["threads", "thread 1", "runs"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/threads/thread%201/runs");
    }

    #[test]
    fn empty_assistant_id_is_rejected() {
        let config = OpenAIConfig::new("sk", "gpt-4o-mini");
        let err = OpenAIAssistantModel::new(config, AssistantConfig::new("")).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }
}
