//! Notification stage: picks subscribers for important judgments, renders
//! alerts, sends them, and records per-address delivery.

pub mod channels;
pub mod digest;
pub mod render;

use std::sync::Arc;

use chrono::{Duration, FixedOffset, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analyze::inference::DynInference;
use crate::config::NotifyConfig;
use crate::error::StoreError;
use crate::model::{Alert, AlertId, Judgment, Subscriber, SubscriptionMode};
use crate::store::Store;

pub use channels::{ChannelRegistry, ChannelSender, RecordingSender};
pub use digest::MarketDigest;

/// Importance at which a judgment counts as important.
pub const IMPORTANT: u8 = 4;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("notify_alerts_created_total", "Alerts created.");
        describe_counter!("notify_sent_total", "Messages delivered, by platform.");
        describe_counter!("notify_failed_total", "Failed deliveries, by platform.");
        describe_counter!("notify_summaries_sent_total", "Daily digests delivered.");
    });
}

/// Whether `sub` wants to hear about `j`.
pub fn should_notify(sub: &Subscriber, j: &Judgment) -> bool {
    if sub.has_mode(SubscriptionMode::All) {
        return true;
    }
    if sub.has_mode(SubscriptionMode::ImportantOnly) && j.importance >= IMPORTANT {
        return true;
    }
    if sub.has_mode(SubscriptionMode::SectorInterest) {
        let sector_hit = j
            .affected_sectors
            .iter()
            .any(|s| sub.interested_sectors.contains(s));
        let instrument_hit = j
            .related_instruments
            .iter()
            .any(|c| sub.interested_instruments.contains(c));
        return sector_hit || instrument_hit;
    }
    false
}

pub fn wants_daily_summary(sub: &Subscriber) -> bool {
    sub.has_mode(SubscriptionMode::DailySummary) || sub.has_mode(SubscriptionMode::All)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteReport {
    pub judgments: usize,
    pub alerts_created: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl RouteReport {
    fn absorb(&mut self, o: RouteOutcome) {
        self.judgments += 1;
        self.alerts_created += usize::from(o.alert_created);
        self.delivered += o.delivered;
        self.failed += o.failed;
    }
}

/// Result of routing one judgment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteOutcome {
    pub alert_created: bool,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryReport {
    pub judgments: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationRouter {
    store: Arc<dyn Store>,
    channels: ChannelRegistry,
    inference: Option<DynInference>,
    cfg: NotifyConfig,
    offset: FixedOffset,
}

impl NotificationRouter {
    pub fn new(
        store: Arc<dyn Store>,
        channels: ChannelRegistry,
        cfg: NotifyConfig,
        offset: FixedOffset,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            channels,
            inference: None,
            cfg,
            offset,
        }
    }

    /// Enables the narrative paragraph of the daily digest.
    pub fn with_inference(mut self, client: DynInference) -> Self {
        self.inference = Some(client);
        self
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Route every important judgment inside the lookback window.
    pub async fn route_important(&self) -> anyhow::Result<RouteReport> {
        let since = Utc::now() - Duration::hours(self.cfg.alert_lookback_hours);
        let judgments = self
            .store
            .judgments(self.cfg.min_importance, Some(since), usize::MAX)
            .await?;
        let subscribers = self.store.active_subscribers().await?;

        let mut report = RouteReport::default();
        for j in &judgments {
            match self.route_to(j, &subscribers).await {
                Ok(o) => report.absorb(o),
                Err(e) => warn!(judgment_id = %j.id, error = %e, "routing failed"),
            }
        }
        info!(
            judgments = report.judgments,
            alerts_created = report.alerts_created,
            delivered = report.delivered,
            failed = report.failed,
            "alert routing done"
        );
        Ok(report)
    }

    /// Route one judgment to the current active subscribers.
    pub async fn route(&self, judgment: &Judgment) -> Result<RouteOutcome, StoreError> {
        let subscribers = self.store.active_subscribers().await?;
        self.route_to(judgment, &subscribers).await
    }

    async fn alert_for(&self, j: &Judgment) -> Result<(Alert, bool), StoreError> {
        if let Some(existing) = self.store.alert_for_judgment(j.id).await? {
            return Ok((existing, false));
        }
        let doc = self.store.document(j.document_id).await?;
        let alert = Alert {
            id: AlertId::new(),
            document_id: j.document_id,
            judgment_id: j.id,
            title: doc
                .as_ref()
                .map(|d| d.title.clone())
                .unwrap_or_else(|| "重要消息".to_string()),
            body: render::render_alert(doc.as_ref(), j, self.offset),
            importance: j.importance,
            delivered_to: Default::default(),
            created_at: Utc::now(),
        };
        let id = alert.id;
        let stored = self.store.insert_alert(alert).await?;
        let created = stored.id == id;
        if created {
            counter!("notify_alerts_created_total").increment(1);
        }
        Ok((stored, created))
    }

    /// One alert per judgment; each matched subscriber not yet in the
    /// alert's delivered set gets one send.
    async fn route_to(
        &self,
        j: &Judgment,
        subscribers: &[Subscriber],
    ) -> Result<RouteOutcome, StoreError> {
        let pending: Vec<&Subscriber> = subscribers
            .iter()
            .filter(|s| should_notify(s, j))
            .collect();

        let (alert, alert_created) = self.alert_for(j).await?;
        let mut outcome = RouteOutcome {
            alert_created,
            ..RouteOutcome::default()
        };

        for sub in pending {
            if alert.delivered_to.contains(&sub.address) {
                continue;
            }
            let platform = sub.platform.as_str();
            match self.channels.send(sub.platform, &sub.address, &alert.body).await {
                Ok(()) => {
                    self.store.record_delivery(alert.id, &sub.address).await?;
                    counter!("notify_sent_total", "platform" => platform).increment(1);
                    debug!(alert_id = %alert.id, platform, "alert delivered");
                    outcome.delivered += 1;
                }
                Err(e) => {
                    counter!("notify_failed_total", "platform" => platform).increment(1);
                    warn!(alert_id = %alert.id, platform, subscriber = %sub.id, error = %e, "alert delivery failed");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Digest of the last day's important judgments. The narrative is only
    /// attempted when `with_narrative` is set and a client is configured; a
    /// failed attempt leaves it empty.
    pub async fn market_digest(&self, with_narrative: bool) -> Result<MarketDigest, StoreError> {
        let now = Utc::now();
        let judgments = self
            .store
            .judgments(self.cfg.min_importance, Some(now - Duration::hours(24)), usize::MAX)
            .await?;
        let mut d = digest::build_digest(&judgments, now);

        if let (true, Some(client)) = (with_narrative, &self.inference) {
            match digest::write_narrative(client.as_ref(), &d).await {
                Ok(n) => d.narrative = n,
                Err(e) => warn!(error = %e, "digest narrative unavailable"),
            }
        }
        Ok(d)
    }

    /// Send the daily digest to subscribers with daily-summary or all.
    pub async fn send_daily_summary(&self) -> anyhow::Result<SummaryReport> {
        let d = self.market_digest(true).await?;
        let text = render::render_digest(&d, self.offset);
        let subscribers = self.store.active_subscribers().await?;

        let mut report = SummaryReport {
            judgments: d.judgments,
            ..SummaryReport::default()
        };
        for sub in subscribers.iter().filter(|s| wants_daily_summary(s)) {
            let platform = sub.platform.as_str();
            match self.channels.send(sub.platform, &sub.address, &text).await {
                Ok(()) => {
                    counter!("notify_summaries_sent_total", "platform" => platform).increment(1);
                    report.delivered += 1;
                }
                Err(e) => {
                    counter!("notify_failed_total", "platform" => platform).increment(1);
                    warn!(platform, subscriber = %sub.id, error = %e, "daily summary delivery failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            judgments = report.judgments,
            delivered = report.delivered,
            failed = report.failed,
            "daily summary sent"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, JudgmentId, Platform};

    fn judgment(importance: u8, sectors: &[&str], codes: &[&str]) -> Judgment {
        Judgment {
            id: JudgmentId::new(),
            document_id: DocumentId::new(),
            sentiment_score: 6,
            sentiment_label: String::new(),
            affected_sectors: sectors.iter().map(|s| s.to_string()).collect(),
            affected_concepts: vec![],
            related_instruments: codes.iter().map(|s| s.to_string()).collect(),
            time_horizon: String::new(),
            importance,
            summary: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sector_interest_ignores_importance() {
        let sub = Subscriber::new(Platform::Telegram, "1")
            .with_modes([SubscriptionMode::SectorInterest])
            .with_sectors(["新能源"]);
        assert!(should_notify(&sub, &judgment(2, &["新能源"], &[])));
        assert!(!should_notify(&sub, &judgment(5, &["金融"], &[])));
    }

    #[test]
    fn sector_interest_matches_instruments() {
        let sub = Subscriber::new(Platform::Telegram, "1")
            .with_modes([SubscriptionMode::SectorInterest])
            .with_instruments(["300750"]);
        assert!(should_notify(&sub, &judgment(1, &[], &["600519", "300750"])));
    }

    #[test]
    fn important_only_threshold() {
        let sub = Subscriber::new(Platform::Telegram, "1")
            .with_modes([SubscriptionMode::ImportantOnly]);
        assert!(!should_notify(&sub, &judgment(3, &[], &[])));
        assert!(should_notify(&sub, &judgment(4, &[], &[])));
    }

    #[test]
    fn all_matches_everything_and_summary_only_matches_nothing() {
        let all = Subscriber::new(Platform::Telegram, "1");
        assert!(should_notify(&all, &judgment(1, &[], &[])));
        assert!(wants_daily_summary(&all));

        let digest_only = Subscriber::new(Platform::Telegram, "2")
            .with_modes([SubscriptionMode::DailySummary]);
        assert!(!should_notify(&digest_only, &judgment(5, &[], &[])));
        assert!(wants_daily_summary(&digest_only));
    }
}
