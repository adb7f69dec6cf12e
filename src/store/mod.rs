//! Persistent store interface.
//!
//! The pipeline only needs simple CRUD plus three atomic primitives:
//! insert-document-if-absent (the dedup boundary), mark-processed and
//! append-delivery. Stages never talk to each other directly; the store is
//! the work queue between them.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{
    Alert, AlertId, Document, DocumentId, Instrument, Judgment, JudgmentId, Source, SourceId,
    Subscriber, SubscriberId,
};

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an insert-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted<Id> {
    Created(Id),
    Existing(Id),
}

impl<Id: Copy> Inserted<Id> {
    pub fn id(&self) -> Id {
        match self {
            Inserted::Created(id) | Inserted::Existing(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- sources ---

    /// Insert or replace a source, keyed by name. The stored id and the
    /// last-attempt timestamp of an existing source are kept.
    async fn upsert_source(&self, source: Source) -> StoreResult<SourceId>;
    async fn active_sources(&self) -> StoreResult<Vec<Source>>;
    async fn record_source_attempt(&self, id: SourceId, at: DateTime<Utc>) -> StoreResult<()>;

    // --- documents ---

    /// First write wins: a document whose url is already stored is not
    /// written and the stored id is returned.
    async fn insert_document_if_absent(&self, doc: Document) -> StoreResult<Inserted<DocumentId>>;
    async fn document(&self, id: DocumentId) -> StoreResult<Option<Document>>;
    async fn document_id_by_url(&self, url: &str) -> StoreResult<Option<DocumentId>>;
    /// Oldest first, so a backlog drains in arrival order.
    async fn unprocessed_documents(&self, limit: usize) -> StoreResult<Vec<Document>>;
    async fn mark_processed(&self, id: DocumentId) -> StoreResult<()>;
    /// Newest first by publish time.
    async fn recent_documents(&self, since: DateTime<Utc>, limit: usize)
        -> StoreResult<Vec<Document>>;
    async fn count_documents(&self) -> StoreResult<usize>;

    // --- judgments ---

    async fn judgment_for_document(&self, id: DocumentId) -> StoreResult<Option<Judgment>>;
    /// Returns the stored judgment. If one already exists for the document it
    /// is returned instead and `judgment` is dropped.
    async fn insert_judgment(&self, judgment: Judgment) -> StoreResult<Judgment>;
    /// Newest first. `since = None` means no lower bound.
    async fn judgments(
        &self,
        min_importance: u8,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Judgment>>;
    async fn count_judgments(&self) -> StoreResult<usize>;

    // --- instruments ---

    async fn upsert_instrument(&self, instrument: Instrument) -> StoreResult<()>;
    async fn instruments(&self) -> StoreResult<Vec<Instrument>>;

    // --- subscribers ---

    /// Keyed by address.
    async fn insert_subscriber_if_absent(
        &self,
        subscriber: Subscriber,
    ) -> StoreResult<Inserted<SubscriberId>>;
    async fn active_subscribers(&self) -> StoreResult<Vec<Subscriber>>;

    // --- alerts ---

    async fn alert_for_judgment(&self, id: JudgmentId) -> StoreResult<Option<Alert>>;
    /// At most one alert per judgment; an existing one is returned instead.
    async fn insert_alert(&self, alert: Alert) -> StoreResult<Alert>;
    /// Append `address` to the alert's delivered set.
    async fn record_delivery(&self, id: AlertId, address: &str) -> StoreResult<()>;

    // --- retention ---

    /// Retention belongs to the storage engine. Backends that implement it
    /// return the number of records removed.
    async fn retention_sweep(&self, _cutoff: DateTime<Utc>) -> StoreResult<usize> {
        Ok(0)
    }
}
