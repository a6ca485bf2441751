//! Prompt assembly from retrieved context and conversation history.

use ragchat_model::ChatMessage;
use ragchat_retrieval::ScoredDocument;

use crate::state::ConversationState;

/// System instruction used when none is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant.";

/// Context text used when retrieval found nothing.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// How retrieved documents become the prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContextSelection {
    /// Only the highest-scoring document.
    #[default]
    TopOne,
    /// Every retrieved document, in rank order, joined by `separator`.
    Concatenate { separator: String },
}

/// Builds the message list sent to a generation provider.
///
/// The user message always follows this template:
///
/// ```text
/// You are an AI assistant. Use the following context to answer the question.
///
/// Context: {context}
///
/// Question: {query}
///
/// Answer:
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_instruction: String,
    selection: ContextSelection,
    history_limit: Option<usize>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            selection: ContextSelection::TopOne,
            history_limit: None,
        }
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_selection(mut self, selection: ContextSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Only replay the last `turns` history messages.
    pub fn with_history_limit(mut self, turns: usize) -> Self {
        self.history_limit = Some(turns);
        self
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// The context text for `retrieved`, which must be ranked best first.
    pub fn select_context(&self, retrieved: &[ScoredDocument]) -> String {
        let Some(best) = retrieved.first() else {
            return NO_CONTEXT.to_string();
        };
        match &self.selection {
            ContextSelection::TopOne => best.document.text.clone(),
            ContextSelection::Concatenate { separator } => retrieved
                .iter()
                .map(|r| r.document.text.as_str())
                .collect::<Vec<_>>()
                .join(separator),
        }
    }

    /// Fill the user prompt template.
    pub fn user_prompt(&self, query: &str, context: &str) -> String {
        format!(
            "You are an AI assistant. Use the following context to answer the question.\n\n\
             Context: {context}\n\n\
             Question: {query}\n\n\
             Answer:"
        )
    }

    /// System instruction, prior local turns (if any), then the templated
    /// user message.
    ///
    /// The last message is always the user prompt. Remote-thread state
    /// contributes no turns.
    pub fn build_prompt(
        &self,
        query: &str,
        retrieved: &[ScoredDocument],
        history: &ConversationState,
    ) -> Vec<ChatMessage> {
        let context = self.select_context(retrieved);
        let turns = history.turns();
        let skip = self.history_limit.map_or(0, |limit| turns.len().saturating_sub(limit));

        let mut messages = Vec::with_capacity(turns.len() - skip + 2);
        messages.push(ChatMessage::system(&self.system_instruction));
        messages.extend(turns[skip..].iter().cloned());
        messages.push(ChatMessage::user(self.user_prompt(query, &context)));
        messages
    }
}
