// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::model::Source;

/// Where the document body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBody {
    /// Body text shipped with the listing (feeds).
    Inline(String),
    /// Article page to fetch and extract.
    Locator(String),
}

/// One item as found on a source, before identity and dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub url: String,
    pub body: RawBody,
    /// Best effort; `None` when the source carries no usable timestamp.
    pub published_at: Option<DateTime<Utc>>,
}

/// Per-source-type fetcher. Implementations are stateless per call.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawDocument>, FetchError>;
    fn name(&self) -> &'static str;
}
