//! Inference client: provider abstraction + response cache + daily call quota.
//!
//! `Provider` does the real remote call; `CachingClient` wraps any provider so
//! production and tests share the same cache and quota path.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::InferenceConfig;
use crate::error::InferenceError;

pub type InferenceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, InferenceError>> + Send + 'a>>;

/// One chat-style request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait object used by the analysis engine and the digest.
pub trait InferenceClient: Send + Sync {
    /// Free-text completion for `prompt`.
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> InferenceFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynInference = Arc<dyn InferenceClient>;

/// Build a client from config.
///
/// * `enabled = false` → disabled client.
/// * `provider = "mock"` → canned neutral judgment, in-memory cache.
/// * `provider = "openai"` → chat completions endpoint, file cache + quota.
///   A missing API key degrades to the disabled client with a warning.
pub fn build_client(cfg: &InferenceConfig) -> DynInference {
    if !cfg.enabled {
        return Arc::new(DisabledClient);
    }
    match cfg.provider().as_str() {
        "mock" => Arc::new(CachingClient::in_memory(
            MockProvider::fixed(MockProvider::NEUTRAL_JUDGMENT),
            cfg.daily_limit,
        )),
        "openai" => match cfg.resolve_api_key() {
            Ok(key) => match OpenAiChatProvider::new(cfg, key) {
                Ok(p) => Arc::new(CachingClient::new(
                    p,
                    PathBuf::from(&cfg.cache_dir),
                    cfg.daily_limit,
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "inference http client build failed, disabling");
                    Arc::new(DisabledClient)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "inference disabled");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown inference provider, disabling");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, prompt: &'a Prompt) -> InferenceFuture<'a>;
    fn name(&self) -> &'static str;
}

/// Any OpenAI-compatible chat completions endpoint.
pub struct OpenAiChatProvider {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatProvider {
    pub fn new(cfg: &InferenceConfig, api_key: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("market-news-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: cfg.completions_url(),
            api_key,
            model: cfg.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: [ChatMsg<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl Provider for OpenAiChatProvider {
    fn fetch<'a>(&'a self, prompt: &'a Prompt) -> InferenceFuture<'a> {
        Box::pin(async move {
            let req = ChatReq {
                model: &self.model,
                messages: [
                    ChatMsg {
                        role: "system",
                        content: &prompt.system,
                    },
                    ChatMsg {
                        role: "user",
                        content: &prompt.user,
                    },
                ],
                temperature: prompt.temperature,
                max_tokens: prompt.max_tokens,
            };

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(InferenceError::Status(resp.status().as_u16()));
            }
            let body: ChatResp = resp.json().await?;
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(InferenceError::EmptyCompletion)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with `InferenceError::Disabled`.
pub struct DisabledClient;

impl InferenceClient for DisabledClient {
    fn complete<'a>(&'a self, _prompt: &'a Prompt) -> InferenceFuture<'a> {
        Box::pin(async { Err(InferenceError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

type Reply = dyn Fn(&Prompt) -> Result<String, InferenceError> + Send + Sync;

/// Scripted provider for tests and local runs. Clones share the call count.
#[derive(Clone)]
pub struct MockProvider {
    reply: Arc<Reply>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub const NEUTRAL_JUDGMENT: &'static str = r#"{"sentiment_score": 5, "sentiment_desc": "中性", "affected_sectors": [], "affected_concepts": [], "related_stocks": [], "time_range": "短期", "importance": 1, "summary": "mock"}"#;

    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with(move |_| Ok(text.clone()))
    }

    pub fn with<F>(f: F) -> Self
    where
        F: Fn(&Prompt) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            reply: Arc::new(f),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, prompt: &'a Prompt) -> InferenceFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = (self.reply)(prompt);
        Box::pin(async move { out })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (response cache + daily limit)
// ------------------------------------------------------------

enum Cache {
    Dir(PathBuf),
    Memory(Mutex<HashMap<String, String>>),
}

pub struct CachingClient<P: Provider> {
    inner: P,
    cache: Cache,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<P: Provider> CachingClient<P> {
    /// File-backed cache; the daily counter persists next to the entries.
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(dir = %cache_dir.display(), error = %e, "inference cache dir unavailable");
        }
        let counter = load_daily_counter(&cache_dir).unwrap_or_default();
        Self {
            inner,
            cache: Cache::Dir(cache_dir),
            daily_limit,
            counter: Mutex::new(counter),
        }
    }

    pub fn in_memory(inner: P, daily_limit: u32) -> Self {
        Self {
            inner,
            cache: Cache::Memory(Mutex::new(HashMap::new())),
            daily_limit,
            counter: Mutex::new(DailyCounter::default()),
        }
    }

    fn cache_get(&self, key: &str) -> Option<String> {
        match &self.cache {
            Cache::Dir(dir) => read_cache_file(dir, key),
            Cache::Memory(m) => lock(m).get(key).cloned(),
        }
    }

    fn cache_put(&self, key: String, text: &str) {
        match &self.cache {
            Cache::Dir(dir) => {
                if let Err(e) = write_cache_file(dir, &key, text) {
                    tracing::debug!(error = %e, "inference cache write failed");
                }
            }
            Cache::Memory(m) => {
                lock(m).insert(key, text.to_string());
            }
        }
    }

    fn save_counter(&self, c: &DailyCounter) {
        if let Cache::Dir(dir) = &self.cache {
            if let Err(e) = save_daily_counter(dir, c) {
                tracing::debug!(error = %e, "daily counter write failed");
            }
        }
    }

    async fn complete_impl(&self, prompt: &Prompt) -> Result<String, InferenceError> {
        let key = cache_key(prompt);
        if let Some(hit) = self.cache_get(&key) {
            counter!("analysis_inference_cache_hits_total").increment(1);
            return Ok(hit);
        }

        // Only real calls count against the quota.
        {
            let mut g = lock(&self.counter);
            if g.is_expired() {
                g.reset_to_today();
                self.save_counter(&g);
            }
            if g.count >= self.daily_limit {
                counter!("analysis_inference_quota_exhausted_total").increment(1);
                return Err(InferenceError::QuotaExhausted(self.daily_limit));
            }
        }

        counter!("analysis_inference_calls_total", "provider" => self.inner.name()).increment(1);
        let fresh = self.inner.fetch(prompt).await?;
        self.cache_put(key, &fresh);
        let mut g = lock(&self.counter);
        g.count = g.count.saturating_add(1);
        self.save_counter(&g);
        Ok(fresh)
    }
}

impl<P: Provider> InferenceClient for CachingClient<P> {
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> InferenceFuture<'a> {
        Box::pin(self.complete_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(prompt: &Prompt) -> String {
    let mut h = Sha256::new();
    h.update(prompt.system.as_bytes());
    h.update([0u8]);
    h.update(prompt.user.as_bytes());
    h.update([0u8]);
    h.update(prompt.temperature.to_le_bytes());
    h.update(prompt.max_tokens.to_le_bytes());
    h.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    text: String,
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str::<CacheEntry>(&s).ok().map(|e| e.text)
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, text: &str) -> io::Result<()> {
    let json = serde_json::to_string(&CacheEntry {
        text: text.to_string(),
    })
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&cache_path(dir, key), &json)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&counter_path(dir), &s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(user: &str) -> Prompt {
        Prompt {
            system: "sys".into(),
            user: user.into(),
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let mock = MockProvider::fixed("ok");
        let client = CachingClient::in_memory(mock.clone(), 10);
        assert_eq!(client.complete(&prompt("a")).await.unwrap(), "ok");
        assert_eq!(client.complete(&prompt("a")).await.unwrap(), "ok");
        assert_eq!(mock.calls(), 1);
        client.complete(&prompt("b")).await.unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn quota_blocks_real_calls_only() {
        let mock = MockProvider::fixed("ok");
        let client = CachingClient::in_memory(mock.clone(), 1);
        client.complete(&prompt("a")).await.unwrap();
        let err = client.complete(&prompt("b")).await.unwrap_err();
        assert!(matches!(err, InferenceError::QuotaExhausted(1)));
        // cached prompt still served
        assert!(client.complete(&prompt("a")).await.is_ok());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn provider_errors_are_not_cached() {
        let mock = MockProvider::with(|_| Err(InferenceError::Status(503)));
        let client = CachingClient::in_memory(mock.clone(), 10);
        assert!(client.complete(&prompt("a")).await.is_err());
        assert!(client.complete(&prompt("a")).await.is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn file_cache_persists_across_clients() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockProvider::fixed("persisted");
        let first = CachingClient::new(mock.clone(), dir.path().to_path_buf(), 10);
        first.complete(&prompt("x")).await.unwrap();

        let second = CachingClient::new(mock.clone(), dir.path().to_path_buf(), 10);
        assert_eq!(second.complete(&prompt("x")).await.unwrap(), "persisted");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_client_errors() {
        let err = DisabledClient.complete(&prompt("a")).await.unwrap_err();
        assert!(matches!(err, InferenceError::Disabled));
    }

    #[test]
    fn disabled_config_builds_disabled_client() {
        let cfg = InferenceConfig {
            enabled: false,
            ..InferenceConfig::default()
        };
        assert_eq!(build_client(&cfg).provider_name(), "disabled");

        let cfg = InferenceConfig {
            provider: "mock".into(),
            ..InferenceConfig::default()
        };
        assert_eq!(build_client(&cfg).provider_name(), "mock");
    }
}
