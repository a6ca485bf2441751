//! # ragchat-model
//!
//! Generation-provider integrations for ragchat.
//!
//! ## Overview
//!
//! - [`ChatModel`] - stateless chat completion over a full message list
//! - [`ThreadedChatModel`] - conversation kept by the provider in a thread
//! - [`MockChatModel`] / [`MockThreadedModel`] - scripted models for tests
//!
//! With the `openai` feature, [`openai::OpenAIChatModel`] and
//! [`openai::OpenAIAssistantModel`] implement the two traits against the
//! OpenAI REST API.
//!
//! ## Supported Models
//!
//! | Model | Description |
//! |-------|-------------|
//! | `gpt-4o-mini` | Fast, cost-effective (default) |
//! | `gpt-4o` | Most capable model |
//! | `gpt-4` | Previous generation flagship |

pub mod error;
pub mod message;
pub mod mock;
pub mod model;
#[cfg(feature = "openai")]
pub mod openai;

pub use error::{ModelError, Result};
pub use message::{ChatMessage, Role};
pub use mock::{MockChatModel, MockThreadedModel};
pub use model::{ChatModel, ThreadedChatModel};
#[cfg(feature = "openai")]
pub use openai::{AssistantConfig, OpenAIAssistantModel, OpenAIChatModel, OpenAIConfig};
