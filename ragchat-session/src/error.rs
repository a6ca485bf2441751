//! Error types for the `ragchat-session` crate.

use ragchat_model::ModelError;
use ragchat_retrieval::RagError;
use thiserror::Error;

/// Errors that end a chat request.
///
/// Every variant leaves the session idle and its history untouched.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request was missing a required input, such as the user message.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another request is still in flight on this session.
    #[error("Session {session_id} is busy with another request")]
    Busy {
        /// The session that rejected the request.
        session_id: String,
    },

    /// Embedding the query or searching the index failed.
    #[error(transparent)]
    Retrieval(#[from] RagError),

    /// The generation provider failed or timed out.
    #[error(transparent)]
    Generation(#[from] ModelError),

    /// The conversation state and the generation provider disagree on whether
    /// history is kept locally or in a remote thread.
    #[error("Session {session_id} cannot switch between local history and a remote thread")]
    ModeMismatch {
        /// The session whose state did not match.
        session_id: String,
    },
}

impl SessionError {
    /// Stable, cause-free name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Busy { .. } => "session_busy",
            Self::Retrieval(e) => e.kind(),
            Self::Generation(e) => e.kind(),
            Self::ModeMismatch { .. } => "mode_mismatch",
        }
    }
}

/// A convenience result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_report_their_own_kind() {
        let err: SessionError = RagError::Validation("empty".into()).into();
        assert_eq!(err.kind(), "validation_error");
        let err: SessionError = ModelError::unavailable("mock", "down").into();
        assert_eq!(err.kind(), "generation_unavailable");
        assert_eq!(SessionError::Busy { session_id: "s".into() }.kind(), "session_busy");
    }
}
