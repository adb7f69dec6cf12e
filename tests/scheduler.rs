// tests/scheduler.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use market_news_monitor::scheduler::{Schedule, TaskRunner, Trigger};
use market_news_monitor::{Orchestrator, OrchestratorState, TaskKind};

#[derive(Default)]
struct CountingRunner {
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    work: Duration,
    panic: bool,
}

#[async_trait]
impl TaskRunner for CountingRunner {
    async fn run_task(&self, _task: TaskKind) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("job blew up");
        }
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn every(secs: u64) -> Vec<Schedule> {
    vec![Schedule {
        task: TaskKind::FetchSources,
        trigger: Trigger::Every(Duration::from_secs(secs)),
    }]
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn interval_job_runs_once_per_period_after_start() {
    let runner = Arc::new(CountingRunner::default());
    let handle = Orchestrator::new(runner.clone(), every(60), utc()).start();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runner.runs.load(Ordering::SeqCst), 0, "no run at start");

    tokio::time::sleep(Duration::from_secs(155)).await;
    assert_eq!(runner.runs.load(Ordering::SeqCst), 3);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn overrunning_job_is_skipped_not_stacked() {
    let runner = Arc::new(CountingRunner {
        work: Duration::from_secs(150),
        ..CountingRunner::default()
    });
    let handle = Orchestrator::new(runner.clone(), every(60), utc()).start();

    tokio::time::sleep(Duration::from_secs(305)).await;
    assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(runner.runs.load(Ordering::SeqCst), 2);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_job_does_not_stop_the_loop() {
    let runner = Arc::new(CountingRunner {
        panic: true,
        ..CountingRunner::default()
    });
    let handle = Orchestrator::new(runner.clone(), every(10), utc()).start();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(runner.runs.load(Ordering::SeqCst), 3);
    assert_eq!(handle.state(), OrchestratorState::Running);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_ends_every_loop() {
    let runner = Arc::new(CountingRunner::default());
    let schedules = vec![
        Schedule {
            task: TaskKind::FetchSources,
            trigger: Trigger::Every(Duration::from_secs(60)),
        },
        Schedule {
            task: TaskKind::RouteAlerts,
            trigger: Trigger::Every(Duration::from_secs(90)),
        },
    ];
    let handle = Orchestrator::new(runner.clone(), schedules, utc()).start();
    assert_eq!(handle.state(), OrchestratorState::Running);

    handle.stop();
    assert_eq!(handle.state(), OrchestratorState::Stopped);
    handle.join().await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
}
