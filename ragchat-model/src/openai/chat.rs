//! Stateless chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::config::OpenAIConfig;
use super::{PROVIDER, error_detail};
use crate::error::{ModelError, Result};
use crate::message::ChatMessage;
use crate::model::ChatModel;

/// A [`ChatModel`] backed by `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAIChatModel {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIChatModel {
    /// Create a new chat model.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client: reqwest::Client::new(), config })
    }

    /// Use a preconfigured HTTP client (proxies, TLS settings, timeouts).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(ModelError::Validation("at least one message is required".into()));
        }
        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            message_count = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&CompletionRequest { model: &self.config.model, messages })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                ModelError::unavailable(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "API error");
            return Err(ModelError::unavailable(
                PROVIDER,
                format!("API returned {status}: {detail}"),
            ));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            ModelError::unavailable(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ModelError::unavailable(PROVIDER, "API returned no message content"))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
