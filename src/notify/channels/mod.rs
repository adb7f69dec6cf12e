//! Delivery channels. A channel takes an address (chat id, webhook URL or
//! mailbox, depending on the platform) and a rendered text.

pub mod discord;
pub mod email;
pub mod memory;
pub mod slack;
pub mod telegram;
pub mod webhook;
pub mod wecom;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::error::DeliveryError;
use crate::model::Platform;

pub use discord::DiscordSender;
pub use email::EmailSender;
pub use memory::RecordingSender;
pub use slack::SlackSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookPoster;
pub use wecom::WecomSender;

#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError>;
    fn platform(&self) -> Platform;
}

/// Platform → sender. Platforms without a sender fail with
/// `DeliveryError::UnsupportedPlatform`.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    senders: HashMap<Platform, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the sender's own platform, replacing any previous one.
    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.platform(), sender);
        self
    }

    /// Webhook platforms are always available; Telegram needs a bot token
    /// and email needs SMTP settings.
    pub fn from_config(cfg: &NotifyConfig) -> Result<Self, reqwest::Error> {
        let poster = WebhookPoster::new(
            Duration::from_secs(cfg.webhook_timeout_secs),
            cfg.webhook_retries,
        )?;

        let mut reg = Self::new()
            .with(Arc::new(WecomSender::new(poster.clone())))
            .with(Arc::new(SlackSender::new(poster.clone())))
            .with(Arc::new(DiscordSender::new(poster.clone())));

        match cfg.telegram_token() {
            Some(token) => {
                reg = reg.with(Arc::new(TelegramSender::new(
                    poster,
                    &cfg.telegram_api_base,
                    &token,
                )));
            }
            None => info!("telegram channel disabled (no bot token)"),
        }

        if let Some(email) = &cfg.email {
            match EmailSender::from_config(email) {
                Ok(sender) => reg = reg.with(Arc::new(sender)),
                Err(e) => warn!(error = %e, "email channel disabled"),
            }
        }
        Ok(reg)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut v: Vec<Platform> = self.senders.keys().copied().collect();
        v.sort();
        v
    }

    pub async fn send(
        &self,
        platform: Platform,
        address: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let sender = self
            .senders
            .get(&platform)
            .ok_or_else(|| DeliveryError::UnsupportedPlatform(platform.to_string()))?;
        sender.send(address, text).await
    }
}
