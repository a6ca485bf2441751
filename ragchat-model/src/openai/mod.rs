//! OpenAI generation providers.
//!
//! - [`OpenAIChatModel`] - stateless chat completions (`POST /chat/completions`)
//! - [`OpenAIAssistantModel`] - server-side threads through the assistants v2 API
//!
//! Both talk to the REST API directly and accept a custom base URL, so they
//! also work with OpenAI-compatible servers.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_model::openai::{OpenAIChatModel, OpenAIConfig};
//!
//! let model = OpenAIChatModel::new(OpenAIConfig::new(
//!     std::env::var("OPENAI_API_KEY")?,
//!     "gpt-4o-mini",
//! ))?;
//! ```
//!
//! This module is only available when the `openai` feature is enabled.

mod assistants;
mod chat;
mod config;

pub use assistants::{AssistantConfig, OpenAIAssistantModel};
pub use chat::OpenAIChatModel;
pub use config::{DEFAULT_CHAT_MODEL, OPENAI_API_BASE, OpenAIConfig};

use serde::Deserialize;

pub(crate) const PROVIDER: &str = "OpenAI";

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Extract the human-readable message from an OpenAI error body.
pub(crate) fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}
