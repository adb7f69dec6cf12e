// tests/ingest_dedup.rs
mod common;

use std::sync::Arc;

use common::{harness, raw, ScriptedAdapter, IMPORTANT_LITHIUM};
use market_news_monitor::analyze::inference::MockProvider;
use market_news_monitor::ingest::{AdapterRegistry, RawBody};
use market_news_monitor::model::{Source, SourceKind};
use market_news_monitor::store::{Inserted, Store};

#[tokio::test]
async fn second_ingest_of_a_url_returns_the_first_id() {
    let h = harness(
        AdapterRegistry::single(Arc::new(ScriptedAdapter::new(vec![]))),
        MockProvider::fixed(IMPORTANT_LITHIUM),
    )
    .await;
    let source = Source::new("要闻", "https://feed.example.cn/", SourceKind::Rss);

    let first = h.pipeline.ingestor.ingest(&source, raw(1)).await.unwrap();
    let Inserted::Created(id) = first else {
        panic!("first ingest must create");
    };

    // Same url, different title and body: first write wins.
    let mut changed = raw(1);
    changed.title = "改写后的标题".into();
    changed.body = RawBody::Inline("新的正文".into());
    let second = h.pipeline.ingestor.ingest(&source, changed).await.unwrap();
    assert_eq!(second, Inserted::Existing(id));

    let doc = h.store.document(id).await.unwrap().unwrap();
    assert_eq!(doc.title, "新闻1");
    assert_eq!(doc.body, "正文1");
    assert!(!doc.processed);
    assert_eq!(doc.source_category, "feed");
    assert_eq!(h.store.count_documents().await.unwrap(), 1);
}

#[tokio::test]
async fn inline_body_is_normalized_and_capped() {
    let h = harness(
        AdapterRegistry::single(Arc::new(ScriptedAdapter::new(vec![]))),
        MockProvider::fixed(IMPORTANT_LITHIUM),
    )
    .await;
    let source = Source::new("要闻", "https://feed.example.cn/", SourceKind::Rss);

    let mut long = raw(9);
    long.body = RawBody::Inline(format!("<div>{}</div>", "字".repeat(6_000)));
    let id = h.pipeline.ingestor.ingest(&source, long).await.unwrap().id();

    let doc = h.store.document(id).await.unwrap().unwrap();
    assert_eq!(doc.body.chars().count(), 5_000);
}
