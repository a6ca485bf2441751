//! JSON bodies of the HTTP API. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Sources to ingest before answering.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponseBody {
    pub assistant_reply: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequestBody {
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub backend: String,
    pub namespace: String,
    pub mode: String,
    pub sessions: usize,
}
