//! Service bundle shared by the orchestrator, the HTTP surface and the
//! binaries. Built once at startup and passed around as `Arc<Pipeline>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, FixedOffset, Utc};
use serde::Serialize;
use tracing::info;

use crate::analyze::{build_client, AnalysisEngine, AnalysisReport, DynInference};
use crate::config::AppConfig;
use crate::ingest::{FetchReport, Ingestor};
use crate::notify::{ChannelRegistry, NotificationRouter, RouteReport, SummaryReport};
use crate::scheduler::{default_schedule, Orchestrator, TaskKind, TaskRunner};
use crate::seed::seed_store;
use crate::store::Store;

/// What one job run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskReport {
    FetchSources(FetchReport),
    AnalyzeUnprocessed(AnalysisReport),
    RouteAlerts(RouteReport),
    DailySummary(SummaryReport),
    Cleanup { removed: usize },
    /// Another run of the same task was still in flight.
    Skipped { kind: TaskKind },
}

/// Marks a task as in flight until dropped, unwinding included.
pub struct TaskClaim<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TaskClaim<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Pipeline {
    pub store: Arc<dyn Store>,
    pub ingestor: Ingestor,
    pub engine: AnalysisEngine,
    pub router: NotificationRouter,
    pub config: AppConfig,
    offset: FixedOffset,
    running: [AtomicBool; TaskKind::ALL.len()],
}

impl Pipeline {
    /// Production wiring from config: seeds reference data, builds the
    /// HTTP-backed adapters, the inference client and the channels.
    pub async fn from_config(config: AppConfig, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        seed_store(store.as_ref()).await?;

        let offset = config.scheduler.offset()?;
        let ingestor = Ingestor::from_config(store.clone(), &config.fetch, offset)
            .context("building source fetcher")?;
        let inference = build_client(&config.inference);
        let channels =
            ChannelRegistry::from_config(&config.notify).context("building channels")?;

        info!(
            inference = inference.provider_name(),
            channels = ?channels.platforms(),
            "pipeline configured"
        );
        Ok(Self::from_parts(config, store, ingestor, inference, channels, offset))
    }

    /// Explicit wiring; tests use this with mock adapters, inference and
    /// recording channels.
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn Store>,
        ingestor: Ingestor,
        inference: DynInference,
        channels: ChannelRegistry,
        offset: FixedOffset,
    ) -> Self {
        let engine = AnalysisEngine::new(
            store.clone(),
            inference.clone(),
            config.analysis.clone(),
            &config.inference,
        );
        let router = NotificationRouter::new(store.clone(), channels, config.notify.clone(), offset)
            .with_inference(inference);
        Self {
            store,
            ingestor,
            engine,
            router,
            config,
            offset,
            running: Default::default(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Hand the retention cutoff to the store. The core never deletes by
    /// itself; backends without retention report zero.
    pub async fn cleanup(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.scheduler.retention_days);
        let removed = self.store.retention_sweep(cutoff).await?;
        info!(%cutoff, removed, "retention sweep done");
        Ok(removed)
    }

    /// Claim `task` for one run. `None` while another run holds it.
    pub fn try_claim(&self, task: TaskKind) -> Option<TaskClaim<'_>> {
        let flag = &self.running[task.index()];
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TaskClaim { flag })
    }

    pub fn is_running(&self, task: TaskKind) -> bool {
        self.running[task.index()].load(Ordering::Acquire)
    }

    /// Run one task. A task never overlaps itself, whoever starts it
    /// (orchestrator, HTTP trigger or CLI); a second concurrent call
    /// returns `TaskReport::Skipped`.
    pub async fn run(&self, task: TaskKind) -> anyhow::Result<TaskReport> {
        let Some(_claim) = self.try_claim(task) else {
            info!(task = task.as_str(), "task already running, skipped");
            return Ok(TaskReport::Skipped { kind: task });
        };
        Ok(match task {
            TaskKind::FetchSources => TaskReport::FetchSources(self.ingestor.fetch_all_sources().await?),
            TaskKind::AnalyzeUnprocessed => {
                TaskReport::AnalyzeUnprocessed(self.engine.analyze_unprocessed().await?)
            }
            TaskKind::RouteAlerts => TaskReport::RouteAlerts(self.router.route_important().await?),
            TaskKind::DailySummary => {
                TaskReport::DailySummary(self.router.send_daily_summary().await?)
            }
            TaskKind::Cleanup => TaskReport::Cleanup {
                removed: self.cleanup().await?,
            },
        })
    }

    /// Orchestrator over the standard schedule.
    pub fn orchestrator(self: &Arc<Self>) -> anyhow::Result<Orchestrator> {
        let schedules = default_schedule(&self.config.scheduler)?;
        Ok(Orchestrator::new(self.clone(), schedules, self.offset))
    }
}

#[async_trait]
impl TaskRunner for Pipeline {
    async fn run_task(&self, task: TaskKind) -> anyhow::Result<()> {
        self.run(task)
            .await
            .map(|_| ())
            .with_context(|| format!("task {}", task.as_str()))
    }
}
