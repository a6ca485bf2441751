use std::sync::Arc;

use anyhow::Context;
use ragchat_server::backend::build_state;
use ragchat_server::{ServerConfig, run_server};
use ragchat_telemetry::{SharedTraceStorage, init_with_storage};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let traces = Arc::new(SharedTraceStorage::new().with_max_sessions(config.session_capacity));
    init_with_storage("ragchat-server", traces.clone()).context("failed to install tracing")?;

    let state = build_state(&config, Some(traces))?;

    if !config.ingest_urls.is_empty() {
        let ingestion = state.ingestion.clone();
        let urls = config.ingest_urls.clone();
        tokio::spawn(async move {
            info!(source_count = urls.len(), "startup ingestion started");
            let report = ingestion.ingest_batch(&urls).await;
            if report.failed() > 0 {
                warn!(
                    stored = report.stored(),
                    failed = report.failed(),
                    "startup ingestion incomplete"
                );
            } else {
                info!(stored = report.stored(), "startup ingestion finished");
            }
        });
    }

    run_server(&config.address(), state).await
}
