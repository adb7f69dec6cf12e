//! WeCom (企业微信) group robot webhook. The address is the robot URL.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelSender, WebhookPoster};
use crate::error::DeliveryError;
use crate::model::Platform;

pub struct WecomSender {
    poster: WebhookPoster,
}

impl WecomSender {
    pub fn new(poster: WebhookPoster) -> Self {
        Self { poster }
    }
}

#[derive(Deserialize)]
struct WecomReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[async_trait]
impl ChannelSender for WecomSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let body = json!({ "msgtype": "text", "text": { "content": text } });
        let rsp = self.poster.post_json("wechat", address, &body).await?;
        // The robot answers 200 with an error code in the body.
        match rsp.json::<WecomReply>().await {
            Ok(r) if r.errcode != 0 => Err(DeliveryError::Rejected {
                platform: "wechat",
                reason: format!("errcode {}: {}", r.errcode, r.errmsg),
            }),
            _ => Ok(()),
        }
    }

    fn platform(&self) -> Platform {
        Platform::Wechat
    }
}
