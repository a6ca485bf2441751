//! # ragchat-server
//!
//! HTTP ingress for ragchat.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /chat` | `{userMessage, threadId?, sources?}` → `{assistantReply, threadId}` |
//! | `POST /ingest` | `{sources}` → per-source ingestion results |
//! | `GET /health` | liveness plus wiring summary |
//! | `GET /debug/trace/{thread_id}` | spans captured for one session |
//!
//! Failures that are not the client's fault answer 500 with [`APOLOGY`];
//! the cause is only logged.

pub mod backend;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::{ServerConfig, VectorBackend};
pub use error::{APOLOGY, ApiError};
pub use server::{AppState, app_router, run_server};
