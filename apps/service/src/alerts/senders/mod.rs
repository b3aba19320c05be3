use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{Alert, AlertChannel};
use crate::config::AlertsConfig;

pub mod log;
pub mod webhook;

pub use log::LogSink;
pub use webhook::WebhookSink;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to send alert: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sink: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Receiver of alerts. The notification system behind it owns delivery
/// (email, SMS, chat); a sink only has to accept the alert.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Channel the sink delivers on, matched against owner preferences
    fn channel(&self) -> AlertChannel;

    async fn on_alert(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// Build the sinks enabled by the configuration. The log sink is always present.
pub fn from_config(config: &AlertsConfig) -> Result<Vec<Arc<dyn AlertSink>>, DispatchError> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];

    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(WebhookSink::new(url, Duration::from_secs(config.webhook_timeout_secs))?));
    }

    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_only_logs() {
        let sinks = from_config(&AlertsConfig::default()).unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "log");
    }

    #[test]
    fn test_webhook_sink_is_added() {
        let config = AlertsConfig {
            webhook_url: Some("https://hooks.example.com/pulse".into()),
            ..Default::default()
        };
        let names: Vec<_> = from_config(&config).unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["log", "webhook"]);
    }

    #[test]
    fn test_bad_webhook_url_is_rejected() {
        let config = AlertsConfig { webhook_url: Some("not a url".into()), ..Default::default() };
        assert!(matches!(from_config(&config), Err(DispatchError::InvalidConfiguration(_))));
    }
}
