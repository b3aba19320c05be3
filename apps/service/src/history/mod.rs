/// History store - append-only check results and windowed aggregates
///
/// Aggregates are never stored: every query recomputes them from the raw
/// results of the window, so they cannot drift from the log.
pub mod statistics;

pub use statistics::{Statistics, Window};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::CheckResult;

/// Raw points and statistics of one monitor over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub monitor_id: Uuid,
    pub window: Window,
    /// Check results in the window, oldest first
    pub points: Vec<CheckResult>,
    pub statistics: Statistics,
}

impl History {
    pub fn new(monitor_id: Uuid, window: Window, points: Vec<CheckResult>) -> Self {
        let statistics = Statistics::compute(&points);
        Self { monitor_id, window, points, statistics }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one definitive check result
    async fn append(&self, result: &CheckResult) -> Result<()>;

    /// Results with `from <= timestamp < to`, oldest first
    async fn results_between(
        &self,
        monitor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>>;

    /// Most recent result of a monitor
    async fn latest_result(&self, monitor_id: Uuid) -> Result<Option<CheckResult>>;

    /// Retention maintenance: drop every result completed before `cutoff`
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn query(&self, monitor_id: Uuid, window: Window) -> Result<History> {
        self.query_at(monitor_id, window, Utc::now()).await
    }

    /// Query the window ending at `now`
    async fn query_at(&self, monitor_id: Uuid, window: Window, now: DateTime<Utc>) -> Result<History> {
        let points = self.results_between(monitor_id, now - window.duration(), now).await?;
        Ok(History::new(monitor_id, window, points))
    }
}
