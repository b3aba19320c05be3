//! Alert dispatching.
//!
//! Status transitions are turned into alerts by the [`AlertDispatcher`],
//! which deduplicates them per down-episode and hands them to every
//! configured [`AlertSink`] whose channel the monitor's owner has enabled.
//! Delivery is best effort: a sink failing never affects the monitor's
//! recorded status.

pub mod dispatcher;
pub mod preferences;
pub mod senders;

pub use dispatcher::{AlertDispatcher, AlertQueue, DispatchPolicy};
pub use preferences::{AlertChannel, NotificationPreferences};
pub use senders::{AlertSink, DispatchError, LogSink, WebhookSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::models::Monitor;
use crate::monitoring::types::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The monitor went down
    Down,
    /// The monitor came back up after a notified outage
    Recovery,
    /// Periodic reminder during a long outage
    StillDown,
    /// Requested by the user to verify delivery
    Test,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Down => write!(f, "down"),
            AlertKind::Recovery => write!(f, "recovery"),
            AlertKind::StillDown => write!(f, "still_down"),
            AlertKind::Test => write!(f, "test"),
        }
    }
}

/// A notification handed to sinks
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub monitor: Monitor,
    /// The check that triggered the alert, absent for test alerts
    pub result: Option<CheckResult>,
    /// User-facing channels the owner has enabled
    pub channels: Vec<AlertChannel>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, monitor: Monitor, result: Option<CheckResult>) -> Self {
        Self {
            kind,
            monitor,
            result,
            channels: NotificationPreferences::default().enabled(),
            raised_at: Utc::now(),
        }
    }

    /// One-line human readable description
    pub fn summary(&self) -> String {
        let monitor = &self.monitor;
        let cause = self
            .result
            .as_ref()
            .and_then(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no diagnostic".to_string());

        match self.kind {
            AlertKind::Down => format!("{} ({}) is DOWN: {}", monitor.name, monitor.url, cause),
            AlertKind::Recovery => {
                match self.result.as_ref().and_then(|r| r.response_time_ms) {
                    Some(ms) => format!("{} ({}) is back UP, responding in {} ms", monitor.name, monitor.url, ms),
                    None => format!("{} ({}) is back UP", monitor.name, monitor.url),
                }
            }
            AlertKind::StillDown => {
                let since = monitor
                    .status_changed_at
                    .map(|at| format!(" since {}", at.format("%Y-%m-%d %H:%M:%S UTC")))
                    .unwrap_or_default();
                format!("{} ({}) is still DOWN{}: {}", monitor.name, monitor.url, since, cause)
            }
            AlertKind::Test => format!("Test alert for {} ({})", monitor.name, monitor.url),
        }
    }
}
