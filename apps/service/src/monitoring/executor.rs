use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::checker::{Checker, HttpChecker};
use super::retry::RetryPolicy;
use super::types::{CheckResult, CheckSettings, ErrorKind};
use crate::config::Config;

/// Monitoring executor - runs one scheduled check (probe + retry policy)
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    retry: RetryPolicy,
}

impl MonitoringExecutor {
    pub fn new(checker: Arc<dyn Checker>, retry: RetryPolicy) -> Self {
        Self { checker, retry }
    }

    /// Executor probing over HTTP with the configured retry policy
    pub fn http(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpChecker::new(&config.probe)?),
            RetryPolicy::from_config(&config.retry),
        ))
    }

    /// Execute a monitoring check
    pub async fn execute_check(&self, monitor_id: Uuid, settings: &CheckSettings) -> CheckResult {
        self.retry.run_with_retries(self.checker.as_ref(), monitor_id, settings).await
    }

    /// Execute a check as its own task.
    ///
    /// A panic inside the checker is caught here and turned into a `down`
    /// result with a connection error, so one broken check can never take the
    /// scheduler or other monitors with it.
    pub async fn execute_isolated(self: &Arc<Self>, monitor_id: Uuid, settings: CheckSettings) -> CheckResult {
        let started_at = Utc::now();
        let executor = Arc::clone(self);

        let handle =
            tokio::spawn(async move { executor.execute_check(monitor_id, &settings).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(monitor = %monitor_id, error = %e, "Check task aborted");
                CheckResult::new(monitor_id, started_at).failure(
                    ErrorKind::ConnectionError { message: format!("check aborted: {e}") },
                    None,
                    None,
                )
            }
        }
    }
}
