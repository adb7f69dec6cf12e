use async_trait::async_trait;
use serde::Serialize;

use super::{ChannelSender, WebhookPoster};
use crate::error::DeliveryError;
use crate::ingest::extract::truncate_chars;
use crate::model::Platform;

// Discord caps embed titles at 256 and descriptions at 4096 characters.
const TITLE_MAX: usize = 256;
const DESCRIPTION_MAX: usize = 4_000;

/// Discord webhook. The first line of the text becomes the embed title.
pub struct DiscordSender {
    poster: WebhookPoster,
}

impl DiscordSender {
    pub fn new(poster: WebhookPoster) -> Self {
        Self { poster }
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_text(text: &str) -> Self {
        let (title, rest) = text.trim().split_once('\n').unwrap_or((text.trim(), ""));
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: truncate_chars(title.trim(), TITLE_MAX),
                description: truncate_chars(rest.trim(), DESCRIPTION_MAX),
            }],
        }
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let payload = DiscordWebhookPayload::from_text(text);
        self.poster.post_json("discord", address, &payload).await?;
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Discord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_is_the_title() {
        let p = DiscordWebhookPayload::from_text("🚨 标题\n\n正文一\n正文二");
        assert_eq!(p.embeds[0].title, "🚨 标题");
        assert_eq!(p.embeds[0].description, "正文一\n正文二");
        assert!(p.content.is_none());
    }
}
