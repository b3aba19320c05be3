use serde::{Deserialize, Serialize};
use std::fmt;

/// Route an alert takes to reach a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    /// Operator log, not user facing
    Log,
    Webhook,
    Email,
    Sms,
    Telegram,
}

impl fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertChannel::Log => write!(f, "log"),
            AlertChannel::Webhook => write!(f, "webhook"),
            AlertChannel::Email => write!(f, "email"),
            AlertChannel::Sms => write!(f, "sms"),
            AlertChannel::Telegram => write!(f, "telegram"),
        }
    }
}

/// Channels an owner wants alerts on. Everything is enabled until the
/// owner opts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub telegram: bool,
    pub webhook: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self { email: true, sms: true, telegram: true, webhook: true }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, channel: AlertChannel) -> bool {
        match channel {
            AlertChannel::Log => true,
            AlertChannel::Webhook => self.webhook,
            AlertChannel::Email => self.email,
            AlertChannel::Sms => self.sms,
            AlertChannel::Telegram => self.telegram,
        }
    }

    /// Enabled user-facing channels, for downstream notification systems
    pub fn enabled(&self) -> Vec<AlertChannel> {
        [AlertChannel::Email, AlertChannel::Sms, AlertChannel::Telegram, AlertChannel::Webhook]
            .into_iter()
            .filter(|channel| self.allows(*channel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_channel_cannot_be_disabled() {
        let muted = NotificationPreferences { email: false, sms: false, telegram: false, webhook: false };
        assert!(muted.allows(AlertChannel::Log));
        assert!(!muted.allows(AlertChannel::Webhook));
        assert!(muted.enabled().is_empty());
    }

    #[test]
    fn test_missing_fields_stay_enabled() {
        let preferences: NotificationPreferences = serde_json::from_str(r#"{ "sms": false }"#).unwrap();
        assert_eq!(preferences.enabled(), [AlertChannel::Email, AlertChannel::Telegram, AlertChannel::Webhook]);
    }
}
