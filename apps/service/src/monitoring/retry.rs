use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use super::checker::Checker;
use super::types::{CheckResult, CheckSettings};
use crate::config::RetryConfig;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Fixed => write!(f, "fixed"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

/// Bounded retries around a [`Checker`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_delay: Duration::from_millis(config.backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms.max(config.backoff_ms)),
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Probe up to `1 + max_retries` times, stopping at the first success.
    ///
    /// A retry is skipped when its backoff plus a full timeout would run past
    /// the monitor's interval. With the default settings (timeout half the
    /// interval) an endpoint that times out therefore gets a single attempt;
    /// fast failures such as refused connections still use every retry.
    /// When every attempt fails the result carries the error of the last one.
    pub async fn run_with_retries(
        &self,
        checker: &dyn Checker,
        monitor_id: Uuid,
        settings: &CheckSettings,
    ) -> CheckResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let target = settings.probe_target();
        let max_attempts = settings.max_retries.saturating_add(1);

        let mut attempts = 0;
        let last_failure = loop {
            attempts += 1;
            let outcome = checker.probe(&target).await;
            if outcome.success {
                return CheckResult::from_probe(monitor_id, started_at, outcome, attempts);
            }

            debug!(
                monitor = %monitor_id,
                attempt = attempts,
                max_attempts,
                error = ?outcome.error,
                "Probe attempt failed"
            );

            if attempts >= max_attempts {
                break outcome;
            }

            let delay = self.delay_for(attempts);
            if clock.elapsed() + delay + target.timeout > settings.interval {
                debug!(monitor = %monitor_id, attempts, "Retry budget exhausted before next interval");
                break outcome;
            }
            sleep(delay).await;
        };

        CheckResult::from_probe(monitor_id, started_at, last_failure, attempts)
    }
}
