//! Telegram Bot API `sendMessage`. The address is the chat id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChannelSender, WebhookPoster};
use crate::error::DeliveryError;
use crate::ingest::extract::truncate_chars;
use crate::model::Platform;

const MESSAGE_MAX: usize = 4_096;

pub struct TelegramSender {
    poster: WebhookPoster,
    endpoint: String,
}

impl TelegramSender {
    pub fn new(poster: WebhookPoster, api_base: &str, token: &str) -> Self {
        Self {
            poster,
            endpoint: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl ChannelSender for TelegramSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let text = truncate_chars(text, MESSAGE_MAX);
        let body = SendMessage {
            chat_id: address,
            text: &text,
            disable_web_page_preview: true,
        };
        let rsp = self.poster.post_json("telegram", &self.endpoint, &body).await?;
        let reply: ApiReply = rsp.json().await.map_err(|e| DeliveryError::Transport {
            platform: "telegram",
            reason: e.to_string(),
        })?;
        if reply.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                platform: "telegram",
                reason: reply.description.unwrap_or_else(|| "ok=false".into()),
            })
        }
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }
}
