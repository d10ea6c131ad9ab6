use crate::domain::notice::Notice;
use crate::domain::payment::OriginRef;
use crate::domain::ports::Notifier;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Writes notices to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, origin: &OriginRef, notice: &Notice) -> Result<()> {
        info!(origin = %origin, text = %notice.render(), "notice");
        Ok(())
    }
}

/// Delivers notices through the Telegram Bot API. The origin is the chat id.
pub struct TelegramNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self {
            endpoint: format!(
                "{}/bot{bot_token}/sendMessage",
                api_base.trim_end_matches('/')
            ),
            client,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, origin: &OriginRef, notice: &Notice) -> Result<()> {
        let body = json!({
            "chat_id": origin.as_str(),
            "text": notice.render(),
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::NotificationError(e.without_url().to_string()))?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::NotificationError(format!("HTTP {status}: {e}")))?;
        if payload.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }
        let description = payload
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        Err(PaymentError::NotificationError(format!(
            "HTTP {status}: {description}"
        )))
    }
}
