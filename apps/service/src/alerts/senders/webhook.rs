use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::{AlertSink, DispatchError};
use crate::alerts::{Alert, AlertChannel};

/// Posts alerts as JSON to a webhook
pub struct WebhookSink {
    client: Client,
    url: Url,
}

#[derive(Serialize)]
struct Payload<'a> {
    /// Ready-to-display message, understood by most chat webhooks
    text: String,
    alert: &'a Alert,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let url = Url::parse(url)
            .map_err(|e| DispatchError::InvalidConfiguration(format!("Invalid webhook URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DispatchError::InvalidConfiguration(format!(
                "Unsupported webhook scheme: {}",
                url.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn channel(&self) -> AlertChannel {
        AlertChannel::Webhook
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), DispatchError> {
        let payload = Payload { text: alert.summary(), alert };

        let response = self.client.post(self.url.clone()).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(DispatchError::SendFailed(format!(
                "Webhook returned non-success status: {}. Body: {}",
                status, error_body
            )));
        }

        Ok(())
    }
}
