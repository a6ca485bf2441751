//! Per-session conversation state.

use std::str::FromStr;

use ragchat_model::ChatMessage;
use serde::{Deserialize, Serialize};

/// Where a conversation's history lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// The session keeps the turns and resends them on every request.
    #[default]
    History,
    /// The provider keeps the turns in a thread; the session only holds its id.
    Thread,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Thread => "thread",
        }
    }
}

impl FromStr for ConversationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "history" | "local" => Ok(Self::History),
            "thread" | "remote" | "assistant" | "assistants" => Ok(Self::Thread),
            other => {
                Err(format!("unknown conversation mode '{other}', expected history or thread"))
            }
        }
    }
}

/// The conversation owned by one session.
///
/// Exactly one representation is active and it never changes for the life
/// of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// Turns kept in process, oldest first. System instructions are not stored.
    Local { turns: Vec<ChatMessage> },
    /// Turns kept by the provider in the thread `thread_id`.
    Remote { thread_id: String },
}

impl ConversationState {
    /// An empty local history.
    pub fn local() -> Self {
        Self::Local { turns: Vec::new() }
    }

    /// A handle to a remote thread.
    pub fn remote(thread_id: impl Into<String>) -> Self {
        Self::Remote { thread_id: thread_id.into() }
    }

    pub fn mode(&self) -> ConversationMode {
        match self {
            Self::Local { .. } => ConversationMode::History,
            Self::Remote { .. } => ConversationMode::Thread,
        }
    }

    /// Local turns; empty for a remote thread.
    pub fn turns(&self) -> &[ChatMessage] {
        match self {
            Self::Local { turns } => turns,
            Self::Remote { .. } => &[],
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::Local { .. } => None,
            Self::Remote { thread_id } => Some(thread_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_from_config_values() {
        assert_eq!("history".parse::<ConversationMode>().unwrap(), ConversationMode::History);
        assert_eq!(" Thread ".parse::<ConversationMode>().unwrap(), ConversationMode::Thread);
        assert!("both".parse::<ConversationMode>().is_err());
    }

    #[test]
    fn remote_state_has_no_local_turns() {
        let state = ConversationState::remote("thread_1");
        assert!(state.turns().is_empty());
        assert_eq!(state.thread_id(), Some("thread_1"));
        assert_eq!(state.mode(), ConversationMode::Thread);
    }
}
