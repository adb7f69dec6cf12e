// src/config/mod.rs
//! Runtime configuration loaded from `config/monitor.toml`.
//!
//! Resolution order:
//! 1) $MONITOR_CONFIG_PATH (must exist when set)
//! 2) config/monitor.toml
//! 3) built-in defaults
//!
//! Every section and field has a default, so a partial file is fine.

pub mod inference;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use inference::InferenceConfig;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub analysis: AnalysisConfig,
    pub inference: InferenceConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
}

/// Query surface defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub default_limit: usize,
    /// Upper bound on any `limit` query parameter.
    pub max_limit: usize,
    pub default_news_hours: i64,
    /// Upper bound on the `hours` query parameter.
    pub max_news_hours: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            default_news_hours: 24,
            max_news_hours: 24 * 30,
        }
    }
}

impl ApiConfig {
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }

    pub fn clamp_news_hours(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_news_hours)
            .clamp(1, self.max_news_hours.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Per HTTP request.
    pub request_timeout_secs: u64,
    /// Attempts per HTTP request, including the first.
    pub retry_times: u8,
    /// Upper bound for one whole source (listing + article pages).
    pub source_timeout_secs: u64,
    pub max_body_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            request_timeout_secs: 30,
            retry_times: 3,
            source_timeout_secs: 180,
            max_body_chars: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub batch_limit: usize,
    /// Delay between two inference calls of one batch.
    pub pacing_ms: u64,
    pub prompt_body_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            pacing_ms: 1_000,
            prompt_body_chars: 2_000,
        }
    }
}

impl AnalysisConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub min_importance: u8,
    /// Judgments older than this are no longer considered for alerts.
    pub alert_lookback_hours: i64,
    /// "ENV" reads TELEGRAM_BOT_TOKEN. Empty disables Telegram.
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub email: Option<EmailConfig>,
    /// Attempts per webhook post, including the first.
    pub webhook_retries: u8,
    pub webhook_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            min_importance: 4,
            alert_lookback_hours: 24,
            telegram_bot_token: "ENV".into(),
            telegram_api_base: "https://api.telegram.org".into(),
            email: None,
            webhook_retries: 3,
            webhook_timeout_secs: 5,
        }
    }
}

impl NotifyConfig {
    /// Resolves the Telegram token; `None` disables the channel.
    pub fn telegram_token(&self) -> Option<String> {
        resolve_secret(&self.telegram_bot_token, "TELEGRAM_BOT_TOKEN")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// "ENV" reads SMTP_HOST.
    pub smtp_host: String,
    /// "ENV" reads SMTP_USER.
    pub smtp_user: String,
    /// "ENV" reads SMTP_PASS.
    pub smtp_pass: String,
    pub from: String,
}

impl EmailConfig {
    pub fn resolved(&self) -> Option<(String, String, String)> {
        Some((
            resolve_secret(&self.smtp_host, "SMTP_HOST")?,
            resolve_secret(&self.smtp_user, "SMTP_USER")?,
            resolve_secret(&self.smtp_pass, "SMTP_PASS")?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub fetch_interval_secs: u64,
    pub analyze_interval_secs: u64,
    pub alert_interval_secs: u64,
    /// "HH:MM" in `utc_offset_hours`.
    pub daily_summary_at: String,
    pub cleanup_at: String,
    pub utc_offset_hours: i32,
    pub retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_interval_secs: 300,
            analyze_interval_secs: 600,
            alert_interval_secs: 900,
            daily_summary_at: "18:00".into(),
            cleanup_at: "02:00".into(),
            utc_offset_hours: 8,
            retention_days: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("utc_offset_hours out of range: {}", self.utc_offset_hours))
    }

    pub fn daily_summary_time(&self) -> Result<NaiveTime> {
        parse_clock(&self.daily_summary_at).context("scheduler.daily_summary_at")
    }

    pub fn cleanup_time(&self) -> Result<NaiveTime> {
        parse_clock(&self.cleanup_at).context("scheduler.cleanup_at")
    }
}

fn parse_clock(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .with_context(|| format!("invalid time of day '{s}', expected HH:MM"))
}

/// `"ENV"` (any case) reads `env_var`; empty means unset.
pub(crate) fn resolve_secret(raw: &str, env_var: &str) -> Option<String> {
    let raw = raw.trim();
    let value = if raw.eq_ignore_ascii_case("env") {
        std::env::var(env_var).ok()?
    } else {
        raw.to_string()
    };
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

const MAX_ATTEMPTS: i64 = 10;
const MAX_LOOKBACK_HOURS: i64 = 24 * 366;
const MAX_RETENTION_DAYS: i64 = 3_650;

fn bounded(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{field} must be within {min}..={max}, got {value}"))
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        self.scheduler.offset()?;
        self.scheduler.daily_summary_time()?;
        self.scheduler.cleanup_time()?;
        if self.scheduler.fetch_interval_secs == 0
            || self.scheduler.analyze_interval_secs == 0
            || self.scheduler.alert_interval_secs == 0
        {
            return Err(anyhow!("scheduler intervals must be positive"));
        }
        bounded("fetch.retry_times", self.fetch.retry_times.into(), 1, MAX_ATTEMPTS)?;
        bounded("notify.webhook_retries", self.notify.webhook_retries.into(), 1, MAX_ATTEMPTS)?;
        bounded("notify.alert_lookback_hours", self.notify.alert_lookback_hours, 1, MAX_LOOKBACK_HOURS)?;
        bounded("scheduler.retention_days", self.scheduler.retention_days, 1, MAX_RETENTION_DAYS)?;
        bounded("api.default_news_hours", self.api.default_news_hours, 1, MAX_LOOKBACK_HOURS)?;
        bounded("api.max_news_hours", self.api.max_news_hours, 1, MAX_LOOKBACK_HOURS)?;
        if !(1..=5).contains(&self.notify.min_importance) {
            return Err(anyhow!(
                "notify.min_importance must be within 1..=5, got {}",
                self.notify.min_importance
            ));
        }
        Ok(())
    }
}
