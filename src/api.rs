//! HTTP query surface: read-only views over the store, subscription
//! management, and one-shot triggers for the scheduled jobs.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::StoreError;
use crate::model::{
    Document, Judgment, Platform, Subscriber, SubscriberId, SubscriptionMode,
};
use crate::notify::{MarketDigest, IMPORTANT};
use crate::pipeline::Pipeline;
use crate::scheduler::{run_guarded, TaskKind};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/news", get(news))
        .route("/analysis", get(analysis))
        .route("/summary", get(summary))
        .route("/subscribers", get(subscribers))
        .route("/subscribe", post(subscribe))
        .route("/crawl", post(trigger_crawl))
        .route("/analyze", post(trigger_analyze))
        .route("/notify", post(trigger_notify))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError(StatusCode::NOT_FOUND, e.to_string()),
            StoreError::Backend(_) => ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": Utc::now() }))
}

#[derive(Deserialize)]
struct NewsQuery {
    hours: Option<i64>,
    limit: Option<usize>,
}

async fn news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> ApiResult<Vec<Document>> {
    let api = &state.pipeline.config.api;
    let hours = api.clamp_news_hours(q.hours);
    let since = Utc::now() - Duration::hours(hours);
    let docs = state
        .pipeline
        .store
        .recent_documents(since, api.clamp_limit(q.limit))
        .await?;
    Ok(Json(docs))
}

#[derive(Deserialize)]
struct AnalysisQuery {
    min_importance: Option<u8>,
    limit: Option<usize>,
}

async fn analysis(
    State(state): State<AppState>,
    Query(q): Query<AnalysisQuery>,
) -> ApiResult<Vec<Judgment>> {
    let min = q.min_importance.unwrap_or(1).clamp(1, 5);
    let limit = state.pipeline.config.api.clamp_limit(q.limit);
    Ok(Json(state.pipeline.store.judgments(min, None, limit).await?))
}

#[derive(Deserialize)]
struct SummaryQuery {
    #[serde(default)]
    narrative: bool,
}

async fn summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQuery>,
) -> ApiResult<MarketDigest> {
    Ok(Json(state.pipeline.router.market_digest(q.narrative).await?))
}

async fn subscribers(State(state): State<AppState>) -> ApiResult<Vec<Subscriber>> {
    Ok(Json(state.pipeline.store.active_subscribers().await?))
}

#[derive(Deserialize)]
struct SubscribeReq {
    platform: Platform,
    address: String,
    #[serde(default)]
    modes: Vec<SubscriptionMode>,
    #[serde(default)]
    sectors: Vec<String>,
    #[serde(default)]
    instruments: Vec<String>,
}

#[derive(Serialize)]
struct SubscribeResp {
    id: SubscriberId,
    created: bool,
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> Result<(StatusCode, Json<SubscribeResp>), ApiError> {
    let address = req.address.trim().to_string();
    if address.is_empty() {
        return Err(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "address is required".into()));
    }
    let modes: BTreeSet<SubscriptionMode> = if req.modes.is_empty() {
        BTreeSet::from([SubscriptionMode::All])
    } else {
        req.modes.into_iter().collect()
    };
    let sub = Subscriber::new(req.platform, address)
        .with_modes(modes)
        .with_sectors(req.sectors.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .with_instruments(req.instruments.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));

    let inserted = state.pipeline.store.insert_subscriber_if_absent(sub).await?;
    let status = if inserted.is_created() {
        info!(subscriber = %inserted.id(), "subscriber added");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SubscribeResp {
            id: inserted.id(),
            created: inserted.is_created(),
        }),
    ))
}

/// Run a job in the background, the same way the orchestrator does. A job
/// that is already running is not started twice.
fn spawn_task(state: &AppState, task: TaskKind) -> (StatusCode, Json<serde_json::Value>) {
    if state.pipeline.is_running(task) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "skipped", "task": task.as_str() })),
        );
    }
    tokio::spawn(run_guarded(state.pipeline.clone(), task));
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "task": task.as_str() })),
    )
}

async fn trigger_crawl(State(state): State<AppState>) -> impl IntoResponse {
    spawn_task(&state, TaskKind::FetchSources)
}

async fn trigger_analyze(State(state): State<AppState>) -> impl IntoResponse {
    spawn_task(&state, TaskKind::AnalyzeUnprocessed)
}

async fn trigger_notify(State(state): State<AppState>) -> impl IntoResponse {
    spawn_task(&state, TaskKind::RouteAlerts)
}

#[derive(Serialize)]
struct Stats {
    documents: usize,
    judgments: usize,
    important_last_24h: usize,
    active_sources: usize,
    active_subscribers: usize,
}

async fn stats(State(state): State<AppState>) -> ApiResult<Stats> {
    let store = &state.pipeline.store;
    let since = Utc::now() - Duration::hours(24);
    Ok(Json(Stats {
        documents: store.count_documents().await?,
        judgments: store.count_judgments().await?,
        important_last_24h: store.judgments(IMPORTANT, Some(since), usize::MAX).await?.len(),
        active_sources: store.active_sources().await?.len(),
        active_subscribers: store.active_subscribers().await?.len(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
