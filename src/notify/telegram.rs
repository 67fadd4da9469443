//! Telegram Bot API transport.
//!
//! API: `POST https://api.telegram.org/bot{token}/sendMessage`
//! Auth: bot token embedded in the path. The token is held as a secret
//! and never appears in logs or error messages.
//! Rate limit: ~30 msg/s globally, 1 msg/s per chat.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::types::NotifyError;

const API_BASE: &str = "https://api.telegram.org";
const TRANSPORT_NAME: &str = "telegram";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    http: Client,
    token: SecretString,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(token: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent("VIGIL/0.1.0")
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            token,
            api_base: API_BASE.to_string(),
        })
    }

    /// Point the client at a different API host (self-hosted Bot API server).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Interpret a Bot API response body.
    fn check_response(body: &str) -> Result<(), NotifyError> {
        let parsed: ApiResponse = serde_json::from_str(body).map_err(|e| NotifyError::Transport {
            transport: TRANSPORT_NAME.to_string(),
            message: format!("unparseable response: {e}"),
        })?;
        if parsed.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                transport: TRANSPORT_NAME.to_string(),
                message: parsed.description.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.token.expose_secret()
        );
        let request = SendMessageRequest {
            chat_id: destination,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                transport: TRANSPORT_NAME.to_string(),
                // The URL carries the token.
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| NotifyError::Transport {
            transport: TRANSPORT_NAME.to_string(),
            message: e.without_url().to_string(),
        })?;
        debug!(status = %status, "Telegram response");

        Self::check_response(&body)
    }

    fn name(&self) -> &str {
        TRANSPORT_NAME
    }
}
