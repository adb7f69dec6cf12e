// tests/routing.rs
mod common;

use std::sync::Arc;

use chrono::Utc;
use common::cst;
use market_news_monitor::config::NotifyConfig;
use market_news_monitor::model::{
    Document, DocumentId, Judgment, JudgmentId, Platform, Subscriber, SubscriptionMode,
};
use market_news_monitor::notify::{ChannelRegistry, NotificationRouter, RecordingSender};
use market_news_monitor::store::{MemoryStore, Store};

async fn judged(store: &dyn Store, title: &str, importance: u8, sectors: &[&str]) -> Judgment {
    let doc = Document {
        id: DocumentId::new(),
        title: title.to_string(),
        body: String::new(),
        url: format!("https://news.example.cn/{}", DocumentId::new()),
        source_name: "要闻".into(),
        source_category: "news".into(),
        published_at: Utc::now(),
        ingested_at: Utc::now(),
        processed: true,
    };
    let doc_id = store.insert_document_if_absent(doc).await.unwrap().id();
    store
        .insert_judgment(Judgment {
            id: JudgmentId::new(),
            document_id: doc_id,
            sentiment_score: 7,
            sentiment_label: "利好".into(),
            affected_sectors: sectors.iter().map(|s| s.to_string()).collect(),
            affected_concepts: vec![],
            related_instruments: vec!["600519".into()],
            time_horizon: "短期".into(),
            importance,
            summary: format!("{title}摘要"),
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

fn router(store: Arc<dyn Store>, senders: Vec<Arc<RecordingSender>>) -> NotificationRouter {
    let channels = senders
        .into_iter()
        .fold(ChannelRegistry::new(), |reg, s| reg.with(s));
    NotificationRouter::new(store, channels, NotifyConfig::default(), cst())
}

#[tokio::test]
async fn subscribers_get_only_what_their_modes_select() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let tg = Arc::new(RecordingSender::new(Platform::Telegram));

    store
        .insert_subscriber_if_absent(
            Subscriber::new(Platform::Telegram, "energy")
                .with_modes([SubscriptionMode::SectorInterest])
                .with_sectors(["新能源"]),
        )
        .await
        .unwrap();
    store
        .insert_subscriber_if_absent(
            Subscriber::new(Platform::Telegram, "digest").with_modes([SubscriptionMode::DailySummary]),
        )
        .await
        .unwrap();

    judged(store.as_ref(), "光伏装机创新高", 5, &["新能源"]).await;
    judged(store.as_ref(), "银行间利率下行", 5, &["金融"]).await;
    // Below the alert threshold: never routed.
    judged(store.as_ref(), "储能小幅波动", 2, &["新能源"]).await;

    let r = router(store.clone(), vec![tg.clone()]);
    let report = r.route_important().await.unwrap();
    assert_eq!(report.judgments, 2);
    assert_eq!(report.alerts_created, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(tg.sent_to("energy"), 1);
    assert_eq!(tg.sent_to("digest"), 0);
    assert!(tg.sent()[0].1.contains("光伏装机创新高"));
}

#[tokio::test]
async fn failed_address_is_retried_without_resending_to_others() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    for addr in ["ok", "flaky"] {
        store
            .insert_subscriber_if_absent(Subscriber::new(Platform::Telegram, addr))
            .await
            .unwrap();
    }
    let j = judged(store.as_ref(), "央行降准", 5, &["金融"]).await;

    let broken = Arc::new(RecordingSender::new(Platform::Telegram).failing_for("flaky"));
    let first = router(store.clone(), vec![broken.clone()]).route(&j).await.unwrap();
    assert!(first.alert_created);
    assert_eq!(first.delivered, 1);
    assert_eq!(first.failed, 1);

    let alert = store.alert_for_judgment(j.id).await.unwrap().unwrap();
    assert!(alert.delivered_to.contains("ok"));
    assert!(!alert.delivered_to.contains("flaky"));

    let healthy = Arc::new(RecordingSender::new(Platform::Telegram));
    let second = router(store.clone(), vec![healthy.clone()]).route(&j).await.unwrap();
    assert!(!second.alert_created);
    assert_eq!(second.delivered, 1);
    assert_eq!(healthy.sent_to("flaky"), 1);
    assert_eq!(healthy.sent_to("ok"), 0);

    let alert = store.alert_for_judgment(j.id).await.unwrap().unwrap();
    assert_eq!(alert.delivered_to.len(), 2);
}

#[tokio::test]
async fn platform_without_sender_counts_as_failure() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store
        .insert_subscriber_if_absent(Subscriber::new(Platform::Email, "ops@example.cn"))
        .await
        .unwrap();
    let j = judged(store.as_ref(), "交易所发布新规", 4, &[]).await;

    let out = router(store.clone(), vec![Arc::new(RecordingSender::new(Platform::Slack))])
        .route(&j)
        .await
        .unwrap();
    assert_eq!(out.delivered, 0);
    assert_eq!(out.failed, 1);
}

#[tokio::test]
async fn daily_summary_goes_to_digest_and_all_subscribers() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let tg = Arc::new(RecordingSender::new(Platform::Telegram));
    for (addr, mode) in [
        ("digest", SubscriptionMode::DailySummary),
        ("everything", SubscriptionMode::All),
        ("urgent", SubscriptionMode::ImportantOnly),
    ] {
        store
            .insert_subscriber_if_absent(Subscriber::new(Platform::Telegram, addr).with_modes([mode]))
            .await
            .unwrap();
    }
    judged(store.as_ref(), "稀土出口管制", 5, &["化工"]).await;

    let report = router(store.clone(), vec![tg.clone()])
        .send_daily_summary()
        .await
        .unwrap();
    assert_eq!(report.judgments, 1);
    assert_eq!(report.delivered, 2);
    assert_eq!(tg.sent_to("urgent"), 0);
    assert!(tg.sent()[0].1.contains("化工"));
}
