//! Long-lived task orchestrator: one tokio task per schedule entry, each
//! waiting for its trigger and then running its job to completion.
//!
//! A job that errors or panics is logged and the loop carries on. Stopping
//! lets an in-flight job finish before its loop exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FetchSources,
    AnalyzeUnprocessed,
    RouteAlerts,
    DailySummary,
    Cleanup,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::FetchSources,
        TaskKind::AnalyzeUnprocessed,
        TaskKind::RouteAlerts,
        TaskKind::DailySummary,
        TaskKind::Cleanup,
    ];

    /// Position in `ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::FetchSources => "fetch_sources",
            TaskKind::AnalyzeUnprocessed => "analyze_unprocessed",
            TaskKind::RouteAlerts => "route_alerts",
            TaskKind::DailySummary => "daily_summary",
            TaskKind::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First run one period after start.
    Every(Duration),
    /// Wall-clock time of day in the orchestrator's UTC offset.
    DailyAt(NaiveTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub task: TaskKind,
    pub trigger: Trigger,
}

/// The five standard jobs.
pub fn default_schedule(cfg: &SchedulerConfig) -> anyhow::Result<Vec<Schedule>> {
    Ok(vec![
        Schedule {
            task: TaskKind::FetchSources,
            trigger: Trigger::Every(Duration::from_secs(cfg.fetch_interval_secs)),
        },
        Schedule {
            task: TaskKind::AnalyzeUnprocessed,
            trigger: Trigger::Every(Duration::from_secs(cfg.analyze_interval_secs)),
        },
        Schedule {
            task: TaskKind::RouteAlerts,
            trigger: Trigger::Every(Duration::from_secs(cfg.alert_interval_secs)),
        },
        Schedule {
            task: TaskKind::DailySummary,
            trigger: Trigger::DailyAt(cfg.daily_summary_time()?),
        },
        Schedule {
            task: TaskKind::Cleanup,
            trigger: Trigger::DailyAt(cfg.cleanup_time()?),
        },
    ])
}

/// Next instant strictly after `now` at which the local clock in `offset`
/// reads `at`.
pub fn next_daily_run(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset);
    let mut date = local_now.date_naive();
    loop {
        if let Some(candidate) = offset.from_local_datetime(&date.and_time(at)).single() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        date = date.checked_add_days(Days::new(1)).unwrap_or(date);
    }
}

/// Whatever actually executes a job.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run_task(&self, task: TaskKind) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Running,
    Stopped,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scheduler_task_runs_total", "Job runs by task and outcome.");
        describe_histogram!("scheduler_task_duration_ms", "Job wall time in milliseconds.");
        describe_gauge!(
            "scheduler_task_last_success_ts",
            "Unix ts of the last successful run per task."
        );
    });
}

pub struct Orchestrator {
    runner: Arc<dyn TaskRunner>,
    schedules: Vec<Schedule>,
    offset: FixedOffset,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn TaskRunner>, schedules: Vec<Schedule>, offset: FixedOffset) -> Self {
        ensure_metrics_described();
        Self {
            runner,
            schedules,
            offset,
        }
    }

    /// Spawn one loop per schedule entry. Requires a tokio runtime.
    pub fn start(self) -> OrchestratorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));

        let tasks = self
            .schedules
            .iter()
            .map(|s| {
                tokio::spawn(schedule_loop(
                    self.runner.clone(),
                    *s,
                    self.offset,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(jobs = self.schedules.len(), "orchestrator started");
        OrchestratorHandle {
            shutdown: shutdown_tx,
            tasks,
            running,
        }
    }
}

pub struct OrchestratorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl OrchestratorHandle {
    pub fn state(&self) -> OrchestratorState {
        if self.running.load(Ordering::SeqCst) && !*self.shutdown.borrow() {
            OrchestratorState::Running
        } else {
            OrchestratorState::Stopped
        }
    }

    /// Ask every loop to exit after its current job.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for every loop to exit.
    pub async fn join(self) {
        for t in self.tasks {
            if let Err(e) = t.await {
                warn!(error = %e, "orchestrator loop ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("orchestrator stopped");
    }

    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

enum Pacer {
    Interval(tokio::time::Interval),
    Daily(NaiveTime),
}

async fn schedule_loop(
    runner: Arc<dyn TaskRunner>,
    schedule: Schedule,
    offset: FixedOffset,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pacer = match schedule.trigger {
        Trigger::Every(period) => {
            let mut t = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Skip);
            Pacer::Interval(t)
        }
        Trigger::DailyAt(at) => Pacer::Daily(at),
    };

    loop {
        if *shutdown.borrow() {
            break;
        }
        let wait = async {
            match &mut pacer {
                Pacer::Interval(t) => {
                    t.tick().await;
                }
                Pacer::Daily(at) => {
                    let now = Utc::now();
                    let next = next_daily_run(now, *at, offset);
                    let d = (next - now).to_std().unwrap_or(Duration::ZERO);
                    tokio::time::sleep(d).await;
                }
            }
        };

        tokio::select! {
            _ = wait => {}
            res = shutdown.changed() => {
                // A dropped sender also means stop.
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        run_guarded(runner.clone(), schedule.task).await;
    }
}

/// Run one job on its own tokio task so a panic is contained and reported.
pub async fn run_guarded(runner: Arc<dyn TaskRunner>, task: TaskKind) {
    let name = task.as_str();
    info!(task = name, "task started");
    let t0 = Instant::now();

    let joined = tokio::spawn(async move { runner.run_task(task).await }).await;
    histogram!("scheduler_task_duration_ms", "task" => name).record(t0.elapsed().as_secs_f64() * 1_000.0);

    match joined {
        Ok(Ok(())) => {
            counter!("scheduler_task_runs_total", "task" => name, "outcome" => "ok").increment(1);
            gauge!("scheduler_task_last_success_ts", "task" => name).set(Utc::now().timestamp() as f64);
            info!(task = name, "task finished");
        }
        Ok(Err(e)) => {
            counter!("scheduler_task_runs_total", "task" => name, "outcome" => "error").increment(1);
            warn!(task = name, "task failed: {e:#}");
        }
        Err(e) if e.is_panic() => {
            counter!("scheduler_task_runs_total", "task" => name, "outcome" => "panic").increment(1);
            error!(task = name, "task panicked");
        }
        Err(e) => {
            counter!("scheduler_task_runs_total", "task" => name, "outcome" => "cancelled").increment(1);
            warn!(task = name, error = %e, "task cancelled");
        }
    }
}
