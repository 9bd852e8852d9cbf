//! Telegram Bot API notifier.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use tracing::debug;

use super::Notifier;
use crate::types::OrbError;

const BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages to one chat via a bot token.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: Secret<String>,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: Secret<String>, chat_id: String) -> Result<Self> {
        Self::with_base_url(BASE_URL, bot_token, chat_id)
    }

    pub fn with_base_url(base_url: &str, bot_token: Secret<String>, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.bot_token.expose_secret()
        );
        let body = serde_json::json!({ "chat_id": self.chat_id, "text": text });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrbError::Notification(format!("Telegram request failed: {}", e.without_url())))?;

        let status = resp.status();
        let parsed: Option<SendMessageResponse> = resp.json().await.ok();
        match parsed {
            Some(r) if status.is_success() && r.ok => {
                debug!(chat_id = %self.chat_id, "Telegram message sent");
                Ok(())
            }
            Some(r) => Err(OrbError::Notification(format!(
                "Telegram error {status}: {}",
                r.description.unwrap_or_default()
            ))
            .into()),
            None => Err(OrbError::Notification(format!("Telegram error {status}")).into()),
        }
    }
}
