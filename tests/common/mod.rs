// tests/common/mod.rs
// Shared wiring for the integration tests: in-memory store, scripted
// source adapter, mock inference and recording channels.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use market_news_monitor::analyze::inference::{CachingClient, MockProvider};
use market_news_monitor::config::AppConfig;
use market_news_monitor::error::{DeliveryError, FetchError};
use market_news_monitor::ingest::{
    AdapterRegistry, HttpFetcher, Ingestor, RawBody, RawDocument, SourceAdapter,
};
use market_news_monitor::model::{Platform, Source};
use market_news_monitor::notify::{ChannelRegistry, ChannelSender, RecordingSender};
use market_news_monitor::seed::default_instruments;
use market_news_monitor::store::{MemoryStore, Store};
use market_news_monitor::Pipeline;

pub const IMPORTANT_LITHIUM: &str = r#"模型分析如下：
{"sentiment_score": 8, "sentiment_desc": "利好", "affected_sectors": ["新能源"],
 "affected_concepts": ["锂电池"], "related_stocks": ["300750", "abc"],
 "time_range": "短期", "importance": 5, "summary": "锂电池需求提升"}"#;

pub fn cst() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

pub fn raw(n: u32) -> RawDocument {
    RawDocument {
        title: format!("新闻{n}"),
        url: format!("https://news.example.cn/a/{n}.html"),
        body: RawBody::Inline(format!("<p>正文{n}</p>")),
        published_at: None,
    }
}

/// Returns the same items on every call and counts calls.
pub struct ScriptedAdapter {
    items: Vec<RawDocument>,
    pub calls: AtomicUsize,
    fail: bool,
}

impl ScriptedAdapter {
    pub fn new(items: Vec<RawDocument>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawDocument>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Status {
                url: source.url.clone(),
                status: 503,
            });
        }
        Ok(self.items.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.analysis.pacing_ms = 0;
    cfg
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn Store>,
    pub model: MockProvider,
    pub telegram: Arc<RecordingSender>,
}

/// Pipeline over an in-memory store seeded with the instrument catalog.
pub async fn harness(adapters: AdapterRegistry, model: MockProvider) -> Harness {
    let telegram = Arc::new(RecordingSender::new(Platform::Telegram));
    let channels = ChannelRegistry::new().with(telegram.clone());
    let (pipeline, store) = harness_with(test_config(), adapters, model.clone(), channels).await;
    Harness {
        pipeline,
        store,
        model,
        telegram,
    }
}

pub async fn harness_with(
    cfg: AppConfig,
    adapters: AdapterRegistry,
    model: MockProvider,
    channels: ChannelRegistry,
) -> (Arc<Pipeline>, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    for i in default_instruments() {
        store.upsert_instrument(i).await.unwrap();
    }

    let fetcher = HttpFetcher::new(&cfg.fetch).unwrap().without_backoff();
    let ingestor = Ingestor::new(store.clone(), adapters, fetcher, &cfg.fetch);
    let inference = Arc::new(CachingClient::in_memory(model, 1_000));

    let pipeline = Arc::new(Pipeline::from_parts(
        cfg,
        store.clone(),
        ingestor,
        inference,
        channels,
        cst(),
    ));
    (pipeline, store)
}

/// Telegram sender that takes `delay` per message and counts per address.
pub struct SlowSender {
    delay: Duration,
    sent: Mutex<Vec<String>>,
}

impl SlowSender {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_to(&self, address: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|a| *a == address).count()
    }
}

#[async_trait]
impl ChannelSender for SlowSender {
    async fn send(&self, address: &str, _text: &str) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;
        self.sent.lock().unwrap().push(address.to_string());
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }
}
