use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::ChannelSender;
use crate::error::DeliveryError;
use crate::model::Platform;

/// Records every message instead of sending it. Used by tests and dry runs.
pub struct RecordingSender {
    platform: Platform,
    sent: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingSender {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            sent: Mutex::new(Vec::new()),
            failing: HashSet::new(),
        }
    }

    /// Sends to `address` will fail with a transport error.
    pub fn failing_for(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    /// `(address, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn sent_to(&self, address: &str) -> usize {
        self.sent().iter().filter(|(a, _)| a == address).count()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        if self.failing.contains(address) {
            return Err(DeliveryError::Transport {
                platform: self.platform.as_str(),
                reason: "recording sender told to fail".into(),
            });
        }
        let mut g = self.sent.lock().unwrap_or_else(|p| p.into_inner());
        g.push((address.to_string(), text.to_string()));
        Ok(())
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}
