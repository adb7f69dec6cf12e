// src/ingest/http.rs
//! Shared HTTP client for source adapters: fixed user agent, per-request
//! timeout, and a fixed number of attempts with exponential backoff.

use std::time::Duration;

use metrics::counter;
use reqwest::Client;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
pub(crate) fn backoff_delay(base: Duration, attempt: u8) -> Duration {
    let factor = 1u32
        .checked_shl(u32::from(attempt.saturating_sub(1)))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_attempts: u8,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(cfg.request_timeout_secs.min(10)))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_attempts: cfg.retry_times.max(1),
            backoff_base: Duration::from_millis(500),
        })
    }

    /// For tests: no waiting between attempts.
    pub fn without_backoff(mut self) -> Self {
        self.backoff_base = Duration::ZERO;
        self
    }

    /// GET `url` and return the body as text. Transport errors and 5xx are
    /// retried; 4xx fails immediately.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let err = match self.client.get(url).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return rsp.text().await.map_err(|e| FetchError::Http {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    let err = FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    if status.is_client_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => FetchError::Http {
                    url: url.to_string(),
                    source: e,
                },
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }
            counter!("fetch_retries_total").increment(1);
            tracing::debug!(%url, attempt, error = %err, "retrying fetch");
            tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
        }
    }

    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Markup {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
    }

    #[test]
    fn backoff_saturates_for_large_attempts() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(Duration::ZERO, 255), Duration::ZERO);
    }
}
