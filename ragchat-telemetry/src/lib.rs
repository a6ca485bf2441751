//! # ragchat-telemetry
//!
//! Tracing setup for ragchat processes.
//!
//! [`init_telemetry`] installs a `tracing-subscriber` registry with an
//! [`EnvFilter`] (`RUST_LOG`, default `info`) and a formatting layer.
//! `RAGCHAT_LOG_FORMAT=json` switches the output to one JSON object per line.
//! [`init_with_storage`] also installs an [`InMemoryTraceLayer`] so the spans
//! of each chat session can be read back from a [`SharedTraceStorage`].

pub mod memory;

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use memory::{
    DEFAULT_MAX_SESSIONS, DEFAULT_MAX_SPANS_PER_SESSION, InMemoryTraceLayer, SharedTraceStorage,
    SpanData, SpanStatus, StatusCode,
};

/// Environment variable selecting the log output format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "RAGCHAT_LOG_FORMAT";

/// Output format of the formatting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read [`LOG_FORMAT_ENV`]; anything other than `json` means text.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    }
}

/// Install the global subscriber.
///
/// Only the first initialisation in a process takes effect; later calls
/// return an error and leave the installed subscriber alone.
pub fn init_telemetry(service_name: &str) -> Result<(), TryInitError> {
    let format = LogFormat::from_env();
    Registry::default().with(fmt_layer(format)).with(env_filter()).try_init()?;
    tracing::info!(service.name = service_name, ?format, "telemetry initialised");
    Ok(())
}

/// [`init_telemetry`] plus span capture into `storage`.
///
/// The capture layer sees every span regardless of the log filter.
pub fn init_with_storage(
    service_name: &str,
    storage: Arc<SharedTraceStorage>,
) -> Result<(), TryInitError> {
    let format = LogFormat::from_env();
    Registry::default()
        .with(InMemoryTraceLayer::new(storage))
        .with(fmt_layer(format).with_filter(env_filter()))
        .try_init()?;
    tracing::info!(service.name = service_name, ?format, "telemetry initialised with span capture");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_json_selects_json() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Text);
        assert_eq!(LogFormat::parse(None), LogFormat::Text);
    }
}
