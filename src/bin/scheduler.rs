//! Standalone job runner without the HTTP surface.
//!
//! `scheduler` runs the periodic jobs until Ctrl-C.
//! `scheduler <task>` runs one job once and prints its report as JSON
//! (tasks: fetch_sources, analyze_unprocessed, route_alerts, daily_summary, cleanup).

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::info;

use market_news_monitor::{init_tracing, AppConfig, MemoryStore, Pipeline, TaskKind};

fn parse_task(s: &str) -> anyhow::Result<TaskKind> {
    TaskKind::ALL
        .iter()
        .copied()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| anyhow!("unknown task '{s}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load_default().context("loading config")?;
    let pipeline = Arc::new(Pipeline::from_config(config, Arc::new(MemoryStore::new())).await?);

    if let Some(arg) = std::env::args().nth(1) {
        let task = parse_task(&arg)?;
        let report = pipeline.run(task).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let handle = pipeline.orchestrator()?.start();
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}
