//! Domain records shared by every stage: sources, documents, judgments,
//! instruments, subscribers and alerts.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(SourceId);
id_type!(DocumentId);
id_type!(JudgmentId);
id_type!(SubscriberId);
id_type!(AlertId);

/// Selects the adapter used to fetch a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SinaFinance,
    Cnstock,
    Csrc,
    Sse,
    Szse,
    Stats,
    Rss,
}

impl SourceKind {
    /// Category recorded on documents: exchange and regulator pages are
    /// official announcements, the rest is press.
    pub fn category(self) -> &'static str {
        match self {
            SourceKind::Csrc | SourceKind::Sse | SourceKind::Szse | SourceKind::Stats => {
                "official"
            }
            SourceKind::SinaFinance | SourceKind::Cnstock => "news",
            SourceKind::Rss => "feed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub active: bool,
    /// Seconds between crawls.
    pub crawl_interval_secs: u64,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: SourceId::new(),
            name: name.into(),
            url: url.into(),
            kind,
            active: true,
            crawl_interval_secs: 300,
            last_attempt_at: None,
        }
    }

    /// A source is due when it was never attempted or its interval has
    /// (almost) elapsed. The 10% slack keeps a source whose interval equals
    /// the fetch tick from being skipped on every other tick.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_attempt_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last).num_seconds().max(0) as u64;
                let slack = self.crawl_interval_secs / 10;
                elapsed + slack >= self.crawl_interval_secs
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub body: String,
    /// Origin locator; unique across the store.
    pub url: String,
    pub source_name: String,
    pub source_category: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub processed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub id: JudgmentId,
    pub document_id: DocumentId,
    /// 1 = strongly bearish, 10 = strongly bullish.
    pub sentiment_score: u8,
    pub sentiment_label: String,
    pub affected_sectors: Vec<String>,
    pub affected_concepts: Vec<String>,
    pub related_instruments: Vec<String>,
    pub time_horizon: String,
    /// 1..=5 stars.
    pub importance: u8,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub name: String,
    pub sector: String,
    pub concepts: Vec<String>,
    pub market: String,
}

impl Instrument {
    pub fn new(code: &str, name: &str, sector: &str, concepts: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            sector: sector.to_string(),
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            market: market_for_code(code).to_string(),
        }
    }

    pub fn has_concept(&self, concept: &str) -> bool {
        self.concepts.iter().any(|c| c == concept)
    }
}

/// Shanghai codes start with 6; everything else trades in Shenzhen.
pub fn market_for_code(code: &str) -> &'static str {
    if code.starts_with('6') {
        "SH"
    } else {
        "SZ"
    }
}

/// Instrument codes are exactly six ASCII digits.
pub fn is_instrument_code(token: &str) -> bool {
    token.len() == 6 && token.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Telegram,
    Wechat,
    Slack,
    Discord,
    Email,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Wechat => "wechat",
            Platform::Slack => "slack",
            Platform::Discord => "discord",
            Platform::Email => "email",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    All,
    #[serde(alias = "important-only")]
    ImportantOnly,
    #[serde(alias = "sector-interest", alias = "sectors")]
    SectorInterest,
    #[serde(alias = "daily-summary")]
    DailySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub platform: Platform,
    /// Chat id, webhook URL or mailbox, depending on the platform.
    pub address: String,
    pub active: bool,
    pub modes: BTreeSet<SubscriptionMode>,
    pub interested_sectors: BTreeSet<String>,
    pub interested_instruments: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(platform: Platform, address: impl Into<String>) -> Self {
        Self {
            id: SubscriberId::new(),
            platform,
            address: address.into(),
            active: true,
            modes: BTreeSet::from([SubscriptionMode::All]),
            interested_sectors: BTreeSet::new(),
            interested_instruments: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = SubscriptionMode>) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    pub fn with_sectors<S: Into<String>>(mut self, sectors: impl IntoIterator<Item = S>) -> Self {
        self.interested_sectors = sectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_instruments<S: Into<String>>(
        mut self,
        codes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.interested_instruments = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_mode(&self, mode: SubscriptionMode) -> bool {
        self.modes.contains(&mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub document_id: DocumentId,
    pub judgment_id: JudgmentId,
    pub title: String,
    pub body: String,
    pub importance: u8,
    /// Addresses the alert was delivered to. Append-only.
    pub delivered_to: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}
