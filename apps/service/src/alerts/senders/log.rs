use async_trait::async_trait;
use tracing::{info, warn};

use super::{AlertSink, DispatchError};
use crate::alerts::{Alert, AlertChannel, AlertKind};

/// Writes every alert to the log
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn channel(&self) -> AlertChannel {
        AlertChannel::Log
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), DispatchError> {
        match alert.kind {
            AlertKind::Down | AlertKind::StillDown => warn!(
                target: "pulse::alerts",
                monitor = %alert.monitor.id,
                kind = %alert.kind,
                "{}",
                alert.summary()
            ),
            AlertKind::Recovery | AlertKind::Test => info!(
                target: "pulse::alerts",
                monitor = %alert.monitor.id,
                kind = %alert.kind,
                "{}",
                alert.summary()
            ),
        }
        Ok(())
    }
}
