//! In-process store backend. Used by tests, local runs and the demo
//! deployment; a document database plugs in behind the same trait.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Inserted, Store, StoreResult};
use crate::error::StoreError;
use crate::model::{
    Alert, AlertId, Document, DocumentId, Instrument, Judgment, JudgmentId, Source, SourceId,
    Subscriber, SubscriberId,
};

#[derive(Default)]
struct Inner {
    sources: Vec<Source>,
    documents: Vec<Document>,
    doc_by_url: HashMap<String, DocumentId>,
    judgments: Vec<Judgment>,
    instruments: HashMap<String, Instrument>,
    subscribers: Vec<Subscriber>,
    alerts: Vec<Alert>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_source(&self, mut source: Source) -> StoreResult<SourceId> {
        let mut g = self.write()?;
        if let Some(existing) = g.sources.iter_mut().find(|s| s.name == source.name) {
            source.id = existing.id;
            source.last_attempt_at = existing.last_attempt_at;
            *existing = source;
            return Ok(existing.id);
        }
        let id = source.id;
        g.sources.push(source);
        Ok(id)
    }

    async fn active_sources(&self) -> StoreResult<Vec<Source>> {
        let g = self.read()?;
        Ok(g.sources.iter().filter(|s| s.active).cloned().collect())
    }

    async fn record_source_attempt(&self, id: SourceId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut g = self.write()?;
        let source = g
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "source",
                id: id.to_string(),
            })?;
        source.last_attempt_at = Some(at);
        Ok(())
    }

    async fn insert_document_if_absent(&self, doc: Document) -> StoreResult<Inserted<DocumentId>> {
        let mut g = self.write()?;
        if let Some(id) = g.doc_by_url.get(&doc.url) {
            return Ok(Inserted::Existing(*id));
        }
        let id = doc.id;
        g.doc_by_url.insert(doc.url.clone(), id);
        g.documents.push(doc);
        Ok(Inserted::Created(id))
    }

    async fn document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        let g = self.read()?;
        Ok(g.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn document_id_by_url(&self, url: &str) -> StoreResult<Option<DocumentId>> {
        Ok(self.read()?.doc_by_url.get(url).copied())
    }

    async fn unprocessed_documents(&self, limit: usize) -> StoreResult<Vec<Document>> {
        let g = self.read()?;
        Ok(g.documents
            .iter()
            .filter(|d| !d.processed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: DocumentId) -> StoreResult<()> {
        let mut g = self.write()?;
        let doc = g
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "document",
                id: id.to_string(),
            })?;
        doc.processed = true;
        Ok(())
    }

    async fn recent_documents(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let g = self.read()?;
        let mut out: Vec<Document> = g
            .documents
            .iter()
            .filter(|d| d.published_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn count_documents(&self) -> StoreResult<usize> {
        Ok(self.read()?.documents.len())
    }

    async fn judgment_for_document(&self, id: DocumentId) -> StoreResult<Option<Judgment>> {
        let g = self.read()?;
        Ok(g.judgments.iter().find(|j| j.document_id == id).cloned())
    }

    async fn insert_judgment(&self, judgment: Judgment) -> StoreResult<Judgment> {
        let mut g = self.write()?;
        if let Some(existing) = g
            .judgments
            .iter()
            .find(|j| j.document_id == judgment.document_id)
        {
            return Ok(existing.clone());
        }
        g.judgments.push(judgment.clone());
        Ok(judgment)
    }

    async fn judgments(
        &self,
        min_importance: u8,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Judgment>> {
        let g = self.read()?;
        let mut out: Vec<Judgment> = g
            .judgments
            .iter()
            .filter(|j| j.importance >= min_importance)
            .filter(|j| since.map_or(true, |s| j.created_at >= s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn count_judgments(&self) -> StoreResult<usize> {
        Ok(self.read()?.judgments.len())
    }

    async fn upsert_instrument(&self, instrument: Instrument) -> StoreResult<()> {
        let mut g = self.write()?;
        g.instruments.insert(instrument.code.clone(), instrument);
        Ok(())
    }

    async fn instruments(&self) -> StoreResult<Vec<Instrument>> {
        let g = self.read()?;
        let mut out: Vec<Instrument> = g.instruments.values().cloned().collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }

    async fn insert_subscriber_if_absent(
        &self,
        subscriber: Subscriber,
    ) -> StoreResult<Inserted<SubscriberId>> {
        let mut g = self.write()?;
        if let Some(existing) = g
            .subscribers
            .iter()
            .find(|s| s.address == subscriber.address)
        {
            return Ok(Inserted::Existing(existing.id));
        }
        let id = subscriber.id;
        g.subscribers.push(subscriber);
        Ok(Inserted::Created(id))
    }

    async fn active_subscribers(&self) -> StoreResult<Vec<Subscriber>> {
        let g = self.read()?;
        Ok(g.subscribers.iter().filter(|s| s.active).cloned().collect())
    }

    async fn alert_for_judgment(&self, id: JudgmentId) -> StoreResult<Option<Alert>> {
        let g = self.read()?;
        Ok(g.alerts.iter().find(|a| a.judgment_id == id).cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> StoreResult<Alert> {
        let mut g = self.write()?;
        if let Some(existing) = g.alerts.iter().find(|a| a.judgment_id == alert.judgment_id) {
            return Ok(existing.clone());
        }
        g.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn record_delivery(&self, id: AlertId, address: &str) -> StoreResult<()> {
        let mut g = self.write()?;
        let alert = g
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "alert",
                id: id.to_string(),
            })?;
        alert.delivered_to.insert(address.to_string());
        Ok(())
    }
}
