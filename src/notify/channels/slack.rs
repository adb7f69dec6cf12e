use async_trait::async_trait;

use super::{ChannelSender, WebhookPoster};
use crate::error::DeliveryError;
use crate::model::Platform;

/// Slack incoming webhook. The address is the webhook URL.
pub struct SlackSender {
    poster: WebhookPoster,
}

impl SlackSender {
    pub fn new(poster: WebhookPoster) -> Self {
        Self { poster }
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "text": text });
        self.poster.post_json("slack", address, &body).await?;
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Slack
    }
}
