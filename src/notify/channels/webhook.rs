//! JSON POST with bounded retries, shared by the webhook channels.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::ingest::http::backoff_delay;

#[derive(Clone)]
pub struct WebhookPoster {
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_base: Duration,
}

impl WebhookPoster {
    pub fn new(timeout: Duration, max_retries: u8) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            timeout,
            max_retries: max_retries.max(1),
            backoff_base: Duration::from_millis(500),
        })
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// POST `body` as JSON. Transport errors and 5xx/429 are retried with
    /// exponential backoff; other non-success statuses fail at once.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        platform: &'static str,
        url: &str,
        body: &T,
    ) -> Result<Response, DeliveryError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(body)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(rsp),
                Ok(rsp) => {
                    let status = rsp.status();
                    let err = DeliveryError::Status {
                        platform,
                        status: status.as_u16(),
                    };
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if !retryable {
                        return Err(err);
                    }
                    err
                }
                Err(e) => DeliveryError::Transport {
                    platform,
                    reason: e.to_string(),
                },
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(platform, attempt, error = %err, "retrying webhook post");
            tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
        }
    }
}
