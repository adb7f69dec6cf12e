// src/analyze/mod.rs
//! Analysis stage: turns unprocessed documents into judgments through the
//! inference contract, then enriches them from the instrument catalog.

pub mod contract;
pub mod enrich;
pub mod inference;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, InferenceConfig};
use crate::error::{ContractError, InferenceError, StoreError};
use crate::model::{Document, Judgment, JudgmentId};
use crate::store::Store;

pub use contract::{build_prompt, decode_contract, JudgmentDraft, REQUIRED_FIELDS};
pub use enrich::{enrich, InstrumentCatalog};
pub use inference::{build_client, DynInference, InferenceClient, Prompt};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analysis_judgments_total", "Judgments written.");
        describe_counter!(
            "analysis_contract_rejections_total",
            "Model outputs rejected by the contract decoder."
        );
        describe_counter!("analysis_inference_errors_total", "Failed inference calls.");
        describe_counter!("analysis_inference_calls_total", "Real (uncached) inference calls.");
        describe_counter!("analysis_inference_cache_hits_total", "Inference cache hits.");
        describe_counter!(
            "analysis_inference_quota_exhausted_total",
            "Calls refused by the daily quota."
        );
        describe_histogram!("analysis_inference_ms", "Inference round trip in milliseconds.");
    });
}

/// What happened to one document.
#[derive(Debug)]
pub enum AnalysisOutcome {
    /// A judgment already existed; nothing was called.
    Existing(Judgment),
    Created(Judgment),
    Rejected(ContractError),
    Failed(InferenceError),
}

impl AnalysisOutcome {
    pub fn into_judgment(self) -> Option<Judgment> {
        match self {
            AnalysisOutcome::Existing(j) | AnalysisOutcome::Created(j) => Some(j),
            AnalysisOutcome::Rejected(_) | AnalysisOutcome::Failed(_) => None,
        }
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub examined: usize,
    pub judged: usize,
    pub rejected: usize,
    pub failed: usize,
}

pub struct AnalysisEngine {
    store: Arc<dyn Store>,
    client: DynInference,
    cfg: AnalysisConfig,
    temperature: f32,
    max_tokens: u32,
}

impl AnalysisEngine {
    pub fn new(
        store: Arc<dyn Store>,
        client: DynInference,
        cfg: AnalysisConfig,
        inference: &InferenceConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            client,
            cfg,
            temperature: inference.temperature,
            max_tokens: inference.max_tokens,
        }
    }

    pub fn client(&self) -> &DynInference {
        &self.client
    }

    pub async fn catalog(&self) -> Result<InstrumentCatalog, StoreError> {
        Ok(InstrumentCatalog::new(&self.store.instruments().await?))
    }

    /// Analyze one document. Returns the stored judgment, or `None` when the
    /// model output was rejected or the call failed.
    pub async fn analyze(&self, doc: &Document) -> Result<Option<Judgment>, StoreError> {
        let catalog = self.catalog().await?;
        Ok(self.analyze_with(doc, &catalog).await?.into_judgment())
    }

    /// `analyze` against a preloaded catalog.
    pub async fn analyze_with(
        &self,
        doc: &Document,
        catalog: &InstrumentCatalog,
    ) -> Result<AnalysisOutcome, StoreError> {
        if let Some(existing) = self.store.judgment_for_document(doc.id).await? {
            debug!(document_id = %doc.id, "judgment exists, skipping inference");
            return Ok(AnalysisOutcome::Existing(existing));
        }

        let prompt = build_prompt(doc, self.cfg.prompt_body_chars, self.temperature, self.max_tokens);
        let t0 = Instant::now();
        let raw = match self.client.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                counter!("analysis_inference_errors_total").increment(1);
                warn!(document_id = %doc.id, provider = self.client.provider_name(), error = %e, "inference failed");
                return Ok(AnalysisOutcome::Failed(e));
            }
        };
        histogram!("analysis_inference_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let draft = match decode_contract(&raw) {
            Ok(d) => d,
            Err(e) => {
                counter!("analysis_contract_rejections_total").increment(1);
                warn!(document_id = %doc.id, error = %e, "model output rejected");
                return Ok(AnalysisOutcome::Rejected(e));
            }
        };

        let judgment = enrich(
            Judgment {
                id: JudgmentId::new(),
                document_id: doc.id,
                sentiment_score: draft.sentiment_score,
                sentiment_label: draft.sentiment_label,
                affected_sectors: draft.affected_sectors,
                affected_concepts: draft.affected_concepts,
                related_instruments: draft.related_instruments,
                time_horizon: draft.time_horizon,
                importance: draft.importance,
                summary: draft.summary,
                created_at: Utc::now(),
            },
            catalog,
        );
        let stored = self.store.insert_judgment(judgment).await?;
        counter!("analysis_judgments_total").increment(1);
        info!(
            document_id = %doc.id,
            title = %doc.title,
            importance = stored.importance,
            score = stored.sentiment_score,
            "document analyzed"
        );
        Ok(AnalysisOutcome::Created(stored))
    }

    /// Analyze up to `batch_limit` unprocessed documents, oldest first, one at
    /// a time with a fixed pause between items. Every examined document is
    /// marked processed whatever the outcome.
    pub async fn analyze_unprocessed(&self) -> anyhow::Result<AnalysisReport> {
        let docs = self.store.unprocessed_documents(self.cfg.batch_limit).await?;
        if docs.is_empty() {
            debug!("no unprocessed documents");
            return Ok(AnalysisReport::default());
        }
        let catalog = self.catalog().await?;
        info!(count = docs.len(), "analysis batch started");

        let mut report = AnalysisReport::default();
        for (i, doc) in docs.iter().enumerate() {
            if i > 0 && !self.cfg.pacing().is_zero() {
                tokio::time::sleep(self.cfg.pacing()).await;
            }
            report.examined += 1;
            match self.analyze_with(doc, &catalog).await {
                Ok(AnalysisOutcome::Existing(_)) | Ok(AnalysisOutcome::Created(_)) => {
                    report.judged += 1
                }
                Ok(AnalysisOutcome::Rejected(_)) => report.rejected += 1,
                Ok(AnalysisOutcome::Failed(_)) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(document_id = %doc.id, error = %e, "storing judgment failed");
                }
            }
            if let Err(e) = self.store.mark_processed(doc.id).await {
                warn!(document_id = %doc.id, error = %e, "mark processed failed");
            }
        }

        info!(
            examined = report.examined,
            judged = report.judged,
            rejected = report.rejected,
            failed = report.failed,
            "analysis batch done"
        );
        Ok(report)
    }
}
