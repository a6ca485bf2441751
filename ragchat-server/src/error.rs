use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragchat_session::SessionError;
use tracing::error;

use crate::protocol::ErrorBody;

/// Body text of every 500 response. Provider error text never reaches clients.
pub const APOLOGY: &str = "Sorry, something went wrong while generating a response.";

/// An error returned by an HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    /// Anything the client cannot fix; `kind` is logged, never sent.
    Internal { kind: &'static str },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(message) => Self::BadRequest(message),
            SessionError::Busy { .. } => Self::Conflict(err.to_string()),
            other => {
                error!(kind = other.kind(), error = %other, "chat request failed");
                Self::Internal { kind: other.kind() }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(message) | Self::Conflict(message) | Self::NotFound(message) => {
                message
            }
            Self::Internal { .. } => APOLOGY.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use ragchat_model::ModelError;
    use ragchat_retrieval::RagError;

    use super::*;

    #[test]
    fn provider_failures_become_the_apology() {
        let err: ApiError =
            SessionError::from(ModelError::unavailable("OpenAI", "invalid api key sk-...")).into();
        assert_eq!(err, ApiError::Internal { kind: "generation_unavailable" });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let store =
            RagError::StoreUnavailable { backend: "pinecone".into(), message: "timeout".into() };
        let err: ApiError = SessionError::from(store).into();
        assert_eq!(err, ApiError::Internal { kind: "store_unavailable" });
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err: ApiError = SessionError::Validation("Message is required".into()).into();
        assert_eq!(err, ApiError::BadRequest("Message is required".into()));

        let err: ApiError = SessionError::Busy { session_id: "t1".into() }.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
