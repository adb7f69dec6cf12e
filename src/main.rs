//! HTTP service entrypoint: boots the pipeline, starts the job orchestrator
//! in the background and serves the query surface.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};

use market_news_monitor::{init_tracing, metrics, router, AppConfig, AppState, MemoryStore, Pipeline};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load_default().context("loading config")?;
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(
        Pipeline::from_config(config, store)
            .await
            .context("building pipeline")?,
    );

    let mut state = AppState::new(pipeline.clone());
    match metrics::install(&pipeline.config) {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let handle = pipeline.orchestrator().context("building schedule")?.start();
    info!(state = ?handle.state(), "background jobs running");
    tokio::spawn(handle.join());

    Ok(router(state).into())
}
