//! Automatic retention and cleanup of check results.
//!
//! Results older than the retention window are bulk-deleted periodically by
//! a background task. This is maintenance only: the hot path never deletes.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::database::Database;

/// How long results are kept and how often expired ones are removed
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep check results
    pub result_days: i64,
    pub cleanup_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&RetentionConfig::default())
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            result_days: config.result_days,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }

    fn retention(&self) -> TimeDelta {
        TimeDelta::days(self.result_days)
    }
}

/// Cleanup manager for expired results
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete every result older than the retention window
    pub async fn cleanup_expired_results(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.policy.retention();
        debug!("Cleaning up results older than {} days (cutoff: {})", self.policy.result_days, cutoff);

        let deleted = self.database.prune_before(cutoff).await?;
        if deleted > 0 {
            info!("Retention cleanup completed: {} results deleted", deleted);
        }
        Ok(deleted)
    }

    /// Start background cleanup task
    pub fn start_periodic_cleanup(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.cleanup_interval);

            loop {
                interval.tick().await;

                if let Err(e) = self.cleanup_expired_results().await {
                    warn!("Periodic results cleanup failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::monitoring::types::CheckResult;
    use uuid::Uuid;

    #[test]
    fn test_retention_policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.result_days, 30);
        assert_eq!(policy.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(policy.retention(), TimeDelta::days(30));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_results() {
        let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let monitor_id = Uuid::new_v4();
        let now = Utc::now();
        for days_ago in [45, 31, 29, 1] {
            let at = now - TimeDelta::days(days_ago);
            database.append(&CheckResult::new(monitor_id, at).success(Some(10), Some(200)).at(at)).await.unwrap();
        }

        let cleanup = RetentionCleanup::new(Arc::clone(&database), RetentionPolicy::default());
        assert_eq!(cleanup.cleanup_expired_results().await.unwrap(), 2);
        assert_eq!(cleanup.cleanup_expired_results().await.unwrap(), 0);

        let remaining = database
            .results_between(monitor_id, now - TimeDelta::days(60), now + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
