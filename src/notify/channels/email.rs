use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::ChannelSender;
use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::ingest::extract::truncate_chars;
use crate::model::Platform;

/// SMTP delivery. The address is the recipient mailbox; the first line of
/// the text is the subject.
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn from_config(cfg: &EmailConfig) -> anyhow::Result<Self> {
        let (host, user, pass) = cfg
            .resolved()
            .ok_or_else(|| anyhow::anyhow!("SMTP_HOST/SMTP_USER/SMTP_PASS not set"))?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)?
            .credentials(Credentials::new(user, pass))
            .build();
        let from = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid sender {:?}: {e}", cfg.from))?;
        Ok(Self { mailer, from })
    }
}

fn subject_of(text: &str) -> String {
    let first = text.trim().lines().next().unwrap_or_default();
    truncate_chars(first.trim(), 120)
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let to: Mailbox = address.parse().map_err(|e| DeliveryError::Rejected {
            platform: "email",
            reason: format!("invalid recipient: {e}"),
        })?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject_of(text))
            .header(header::ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| DeliveryError::Rejected {
                platform: "email",
                reason: e.to_string(),
            })?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| DeliveryError::Transport {
                platform: "email",
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Email
    }
}
