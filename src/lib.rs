// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod seed;
pub mod store;

// Pipeline stages: sources -> documents -> judgments -> alerts
pub mod analyze;
pub mod ingest;
pub mod notify;

// Background jobs
pub mod pipeline;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::pipeline::{Pipeline, TaskReport};
pub use crate::scheduler::{Orchestrator, OrchestratorHandle, OrchestratorState, TaskKind};
pub use crate::store::{MemoryStore, Store};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `LOG_FORMAT=json` switches to
/// JSON lines; `RUST_LOG` overrides the default filter. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_news_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
