//! Chat notifications for detected tokens.
//!
//! Sends are fire-and-forget: a failed notification is logged and never
//! affects the pipeline.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Used when no chat is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        debug!(len = text.len(), "notifications disabled, dropping message");
        Ok(())
    }
}

/// Telegram Bot API `sendMessage` with HTML formatting.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API.to_string(), bot_token, chat_id, timeout)
    }

    pub fn with_base_url(
        base_url: String,
        bot_token: String,
        chat_id: String,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(timeout).build()?;
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
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Http { status, body });
        }
        debug!(chat_id = %self.chat_id, "telegram message sent");
        Ok(())
    }
}

/// Send `text` on a detached task; failures are only logged.
pub fn notify_detached(notifier: Arc<dyn Notifier>, text: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&text).await {
            warn!(error = %e, "notification failed");
        }
    });
}

/// HTML message announcing a newly detected token.
pub fn detection_message(signature: &str, mint: &str) -> String {
    format!(
        "🚀 <b>New token detected</b>\n\n\
         🪙 <b>Mint:</b> <code>{mint}</code>\n\
         🔗 <b>Transaction:</b> https://solscan.io/tx/{signature}\n\
         📊 <b>GMGN:</b> https://gmgn.ai/sol/token/{mint}\n\
         📈 <b>BullX:</b> https://neo.bullx.io/terminal?chainId=1399811149&address={mint}"
    )
}
