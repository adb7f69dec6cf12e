// src/config/inference.rs
use serde::Deserialize;

use super::resolve_secret;

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1_000
}
fn default_daily_limit() -> u32 {
    500
}
fn default_cache_dir() -> String {
    "cache/inference".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub enabled: bool,
    /// "openai" (any OpenAI-compatible chat endpoint) | "mock"
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Real calls per UTC day; cache hits are free.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".into(),
            api_key: "ENV".into(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            daily_limit: default_daily_limit(),
            cache_dir: default_cache_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    pub fn provider(&self) -> String {
        self.provider.trim().to_ascii_lowercase()
    }

    /// Resolve the API key ("ENV" → OPENAI_API_KEY).
    pub fn resolve_api_key(&self) -> anyhow::Result<String> {
        resolve_secret(&self.api_key, "OPENAI_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))
    }

    /// Chat completions URL; tolerates a trailing slash on `base_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_joins_cleanly() {
        let cfg = InferenceConfig {
            base_url: "https://llm.example.com/v1/".into(),
            ..InferenceConfig::default()
        };
        assert_eq!(
            cfg.completions_url(),
            "https://llm.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn provider_is_normalized() {
        let cfg = InferenceConfig {
            provider: " OpenAI ".into(),
            ..InferenceConfig::default()
        };
        assert_eq!(cfg.provider(), "openai");
    }
}
