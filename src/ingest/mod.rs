// src/ingest/mod.rs
//! Fetch stage: runs every due source through its adapter, resolves bodies,
//! and writes new documents through the store's insert-if-absent.

pub mod extract;
pub mod http;
pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{FetchError, StoreError};
use crate::model::{Document, DocumentId, Source};
use crate::store::{Inserted, Store};

pub use extract::{extract_article_text, normalize_text, parse_publish_time};
pub use http::HttpFetcher;
pub use providers::AdapterRegistry;
pub use types::{RawBody, RawDocument, SourceAdapter};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_documents_total", "New documents written to the store.");
        describe_counter!(
            "ingest_duplicates_total",
            "Raw documents whose url was already stored."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetches that failed or timed out."
        );
        describe_counter!("fetch_retries_total", "HTTP requests retried after a failure.");
        describe_counter!(
            "ingest_body_errors_total",
            "Article pages that could not be fetched (document kept with empty body)."
        );
        describe_histogram!("fetch_duration_ms", "Wall time of one source fetch in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Adapter parse time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when the fetch stage last ran.");
    });
}

/// Build the stored record for a raw document. Publish time defaults to
/// `now`; the body is capped at `max_body_chars`.
pub fn build_document(
    source: &Source,
    raw: RawDocument,
    body: String,
    max_body_chars: usize,
    now: DateTime<Utc>,
) -> Document {
    Document {
        id: DocumentId::new(),
        title: raw.title,
        body: extract::truncate_chars(&body, max_body_chars),
        url: raw.url,
        source_name: source.name.clone(),
        source_category: source.kind.category().to_string(),
        published_at: raw.published_at.unwrap_or(now),
        ingested_at: now,
        processed: false,
    }
}

/// Per-source result of one fetch tick.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub error: Option<String>,
}

/// Aggregate of one `fetch_all_sources` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub created: usize,
    pub duplicates: usize,
    pub outcomes: Vec<SourceOutcome>,
}

#[derive(Default)]
struct Counts {
    fetched: usize,
    created: usize,
    duplicates: usize,
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    adapters: AdapterRegistry,
    fetcher: HttpFetcher,
    max_body_chars: usize,
    source_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: AdapterRegistry,
        fetcher: HttpFetcher,
        cfg: &FetchConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            adapters,
            fetcher,
            max_body_chars: cfg.max_body_chars,
            source_timeout: Duration::from_secs(cfg.source_timeout_secs),
        }
    }

    /// Standard adapter wiring from config.
    pub fn from_config(
        store: Arc<dyn Store>,
        cfg: &FetchConfig,
        offset: FixedOffset,
    ) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(cfg)?;
        let adapters = AdapterRegistry::standard(fetcher.clone(), offset);
        Ok(Self::new(store, adapters, fetcher, cfg))
    }

    /// Fetch every active, due source concurrently. A failing or slow source
    /// is logged and counted; it never affects its siblings.
    pub async fn fetch_all_sources(&self) -> anyhow::Result<FetchReport> {
        let now = Utc::now();
        let due: Vec<Source> = self
            .store
            .active_sources()
            .await?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();

        let outcomes = join_all(due.iter().map(|s| self.fetch_source(s))).await;

        let mut report = FetchReport {
            sources_attempted: outcomes.len(),
            ..FetchReport::default()
        };
        for o in &outcomes {
            report.created += o.created;
            report.duplicates += o.duplicates;
            if o.error.is_some() {
                report.sources_failed += 1;
            }
        }
        report.outcomes = outcomes;

        gauge!("ingest_last_run_ts").set(now.timestamp() as f64);
        info!(
            sources = report.sources_attempted,
            failed = report.sources_failed,
            created = report.created,
            duplicates = report.duplicates,
            "fetch tick done"
        );
        Ok(report)
    }

    async fn fetch_source(&self, source: &Source) -> SourceOutcome {
        let started = Utc::now();
        let t0 = Instant::now();

        let res = match tokio::time::timeout(self.source_timeout, self.crawl(source)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout {
                source_name: source.name.clone(),
                secs: self.source_timeout.as_secs(),
            }),
        };

        histogram!("fetch_duration_ms", "source" => source.name.clone())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        // Attempt time is recorded on failure too: a broken source waits a
        // full interval like any other.
        if let Err(e) = self.store.record_source_attempt(source.id, started).await {
            warn!(source = %source.name, error = %e, "failed to record source attempt");
        }

        match res {
            Ok(c) => {
                debug!(source = %source.name, fetched = c.fetched, created = c.created, "source fetched");
                SourceOutcome {
                    source: source.name.clone(),
                    fetched: c.fetched,
                    created: c.created,
                    duplicates: c.duplicates,
                    error: None,
                }
            }
            Err(e) => {
                counter!("ingest_source_errors_total", "source" => source.name.clone()).increment(1);
                warn!(source = %source.name, error = %e, "source fetch failed");
                SourceOutcome {
                    source: source.name.clone(),
                    fetched: 0,
                    created: 0,
                    duplicates: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn crawl(&self, source: &Source) -> Result<Counts, FetchError> {
        let adapter = self.adapters.for_kind(source.kind);
        let raws = adapter.fetch(source).await?;
        debug!(source = %source.name, adapter = adapter.name(), items = raws.len(), "listing parsed");

        let mut counts = Counts {
            fetched: raws.len(),
            ..Counts::default()
        };
        for raw in raws {
            let url = raw.url.clone();
            match self.ingest(source, raw).await {
                Ok(Inserted::Created(_)) => counts.created += 1,
                Ok(Inserted::Existing(_)) => counts.duplicates += 1,
                Err(e) => warn!(source = %source.name, %url, error = %e, "ingest failed"),
            }
        }
        Ok(counts)
    }

    /// Persist one raw document unless its url is already stored. Known urls
    /// short-circuit before the article page is fetched.
    pub async fn ingest(
        &self,
        source: &Source,
        raw: RawDocument,
    ) -> Result<Inserted<DocumentId>, StoreError> {
        if let Some(id) = self.store.document_id_by_url(&raw.url).await? {
            counter!("ingest_duplicates_total").increment(1);
            return Ok(Inserted::Existing(id));
        }

        let body = self.resolve_body(&raw.body).await;
        let doc = build_document(source, raw, body, self.max_body_chars, Utc::now());
        let res = self.store.insert_document_if_absent(doc).await?;
        if res.is_created() {
            counter!("ingest_documents_total", "source" => source.name.clone()).increment(1);
        } else {
            counter!("ingest_duplicates_total").increment(1);
        }
        Ok(res)
    }

    async fn resolve_body(&self, body: &RawBody) -> String {
        match body {
            RawBody::Inline(text) => normalize_text(text, self.max_body_chars),
            RawBody::Locator(url) => match self.fetcher.get_text(url).await {
                Ok(html) => extract_article_text(&html, self.max_body_chars),
                Err(e) => {
                    counter!("ingest_body_errors_total").increment(1);
                    warn!(%url, error = %e, "article fetch failed, keeping empty body");
                    String::new()
                }
            },
        }
    }
}
