// tests/api_http.rs
mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use http::{Request, StatusCode};
use axum::Router;
use common::{harness, raw, ScriptedAdapter, IMPORTANT_LITHIUM};
use market_news_monitor::analyze::inference::MockProvider;
use market_news_monitor::ingest::AdapterRegistry;
use market_news_monitor::model::{Source, SourceKind};
use market_news_monitor::store::Store;
use market_news_monitor::{router, AppState, Pipeline, TaskKind};
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

const BODY_LIMIT: usize = 1_048_576;

async fn app_with_data() -> Router {
    app_and_pipeline().await.0
}

async fn app_and_pipeline() -> (Router, Arc<Pipeline>) {
    let h = harness(
        AdapterRegistry::single(Arc::new(ScriptedAdapter::new(vec![raw(1), raw(2), raw(3)]))),
        MockProvider::fixed(IMPORTANT_LITHIUM),
    )
    .await;
    h.store
        .upsert_source(Source::new("要闻", "https://feed.example.cn/", SourceKind::Rss))
        .await
        .unwrap();
    h.pipeline.run(TaskKind::FetchSources).await.unwrap();
    h.pipeline.run(TaskKind::AnalyzeUnprocessed).await.unwrap();
    (router(AppState::new(h.pipeline.clone())), h.pipeline)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_json(app: &Router, uri: &str, payload: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_is_ok() {
    let app = app_with_data().await;
    let (status, v) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
}

#[tokio::test]
async fn news_respects_limit() {
    let app = app_with_data().await;
    let (status, v) = get_json(&app, "/news?hours=24&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0]["url"].as_str().unwrap().starts_with("https://news.example.cn/"));
}

#[tokio::test]
async fn analysis_filters_by_importance() {
    let app = app_with_data().await;
    let (_, v) = get_json(&app, "/analysis?min_importance=5").await;
    assert_eq!(v.as_array().unwrap().len(), 3);

    let (_, v) = get_json(&app, "/analysis?min_importance=5&limit=1").await;
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["importance"], 5);
}

#[tokio::test]
async fn summary_reports_sector_mood() {
    let app = app_with_data().await;
    let (status, v) = get_json(&app, "/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["judgments"], 3);
    assert_eq!(v["sectors"][0]["sector"], "新能源");
    assert!(v["narrative"].is_null());
}

#[tokio::test]
async fn subscribe_is_idempotent_per_address() {
    let app = app_with_data().await;
    let payload = r#"{"platform":"wechat","address":"https://qyapi.example/hook","modes":["sector_interest"],"sectors":["新能源"]}"#;

    let (status, first) = post_json(&app, "/subscribe", payload).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);

    let (status, second) = post_json(&app, "/subscribe", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(second["id"], first["id"]);

    let (_, subs) = get_json(&app, "/subscribers").await;
    let subs = subs.as_array().unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0]["interested_sectors"][0], "新能源");
}

#[tokio::test]
async fn subscribe_rejects_blank_address() {
    let app = app_with_data().await;
    let (status, v) = post_json(&app, "/subscribe", r#"{"platform":"slack","address":"  "}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].as_str().is_some());
}

#[tokio::test]
async fn triggers_are_accepted() {
    let app = app_with_data().await;
    for (uri, task) in [
        ("/crawl", "fetch_sources"),
        ("/analyze", "analyze_unprocessed"),
        ("/notify", "route_alerts"),
    ] {
        let (status, v) = post_json(&app, uri, "").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(v["task"], task);
    }
}

#[tokio::test]
async fn stats_count_store_contents() {
    let app = app_with_data().await;
    let (_, v) = get_json(&app, "/stats").await;
    assert_eq!(v["documents"], 3);
    assert_eq!(v["judgments"], 3);
    assert_eq!(v["important_last_24h"], 3);
    assert_eq!(v["active_sources"], 1);
    assert_eq!(v["active_subscribers"], 0);
}

#[tokio::test]
async fn metrics_without_recorder_is_not_found() {
    let app = app_with_data().await;
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn news_window_is_clamped() {
    let app = app_with_data().await;
    let (status, v) = get_json(&app, "/news?hours=3000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().unwrap().len(), 3);

    let (status, _) = get_json(&app, "/news?hours=-9223372036854775808").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn trigger_for_running_task_is_skipped() {
    let (app, pipeline) = app_and_pipeline().await;
    let held = pipeline.try_claim(TaskKind::RouteAlerts).unwrap();

    let (status, v) = post_json(&app, "/notify", "").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["status"], "skipped");
    assert_eq!(v["task"], "route_alerts");

    drop(held);
    let (status, _) = post_json(&app, "/notify", "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
}
