use anyhow::Context;
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::AppConfig;

/// Install the global Prometheus recorder. Call once per process; the
/// handle renders the `/metrics` page.
pub fn install(cfg: &AppConfig) -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;

    // Static gauges describing the configured cadence.
    gauge!("config_fetch_interval_secs").set(cfg.scheduler.fetch_interval_secs as f64);
    gauge!("config_analyze_interval_secs").set(cfg.scheduler.analyze_interval_secs as f64);
    gauge!("config_alert_min_importance").set(f64::from(cfg.notify.min_importance));
    gauge!("config_inference_daily_limit").set(f64::from(cfg.inference.daily_limit));

    Ok(handle)
}
