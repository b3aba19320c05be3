use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::alerts::AlertQueue;
use crate::database::Database;
use crate::monitoring::scheduler::SchedulerHandle;
use crate::monitoring::state::StateChange;
use crate::monitoring::types::{CheckResult, MonitorStatus, StatusTransition};

/// What became of one check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// Appended and applied to the monitor's state. `alerted` is set when
    /// the result was forwarded to the alert dispatcher.
    Recorded { change: Option<StateChange>, alerted: bool },
    /// The monitor was deleted while the check was in flight, or the check
    /// started after the monitor was paused
    Discarded,
}

/// Applies check results: history first, then the state machine, then alerts.
///
/// Runs as a single task, so the read-modify-write of a monitor's state is
/// never interleaved with another result for the same monitor.
pub struct ResultProcessor {
    database: Arc<dyn Database>,
    scheduler: Option<SchedulerHandle>,
    alerts: AlertQueue,
}

impl ResultProcessor {
    pub fn new(database: Arc<dyn Database>, scheduler: Option<SchedulerHandle>, alerts: AlertQueue) -> Self {
        Self { database, scheduler, alerts }
    }

    pub fn spawn(self, mut results: mpsc::Receiver<CheckResult>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                let monitor_id = result.monitor_id;
                if let Err(e) = self.process(result).await {
                    error!(monitor = %monitor_id, "Failed to process check result: {:#}", e);
                }
            }
            debug!("Result processor stopped");
        })
    }

    pub async fn process(&self, result: CheckResult) -> Result<Processed> {
        let id = result.monitor_id;

        let Some(mut monitor) = self.database.get_monitor(id).await? else {
            debug!(monitor = %id, "Discarding result of deleted monitor");
            self.unschedule(id);
            return Ok(Processed::Discarded);
        };

        if monitor.paused_at.is_some_and(|paused_at| result.started_at >= paused_at) {
            // Paused by another process before this check began
            debug!(monitor = %id, "Discarding result of check started after pause");
            self.unschedule(id);
            return Ok(Processed::Discarded);
        }

        self.database.append(&result).await?;

        let mut state = monitor.state();
        let change = state.apply(result.outcome, monitor.failure_threshold);
        let changed_at = change.map(|_| result.timestamp);

        if let Some(change) = change {
            self.database
                .record_transition(&StatusTransition {
                    monitor_id: id,
                    from: change.from,
                    to: change.to,
                    at: result.timestamp,
                })
                .await?;
        }

        if !self.database.update_check_state(id, state, result.timestamp, changed_at).await? {
            // Deleted after we read it: purge what was just written
            self.database.delete_monitor(id).await?;
            self.unschedule(id);
            debug!(monitor = %id, "Monitor deleted mid-flight, result discarded");
            return Ok(Processed::Discarded);
        }

        monitor.status = state.status;
        monitor.consecutive_failures = state.consecutive_failures;
        monitor.last_checked_at = Some(result.timestamp);
        if changed_at.is_some() {
            monitor.status_changed_at = changed_at;
        }

        debug!(
            monitor = %id,
            outcome = %result.outcome,
            attempts = result.attempts,
            response_time_ms = ?result.response_time_ms,
            http_status = ?result.http_status,
            "Check recorded"
        );

        if let Some(change) = change {
            info!(
                target: "pulse::audit",
                monitor = %id,
                from = %change.from,
                to = %change.to,
                error = ?result.error,
                "Monitor status changed"
            );
        }

        if !monitor.is_active() {
            debug!(monitor = %id, "Monitor paused mid-flight, no alert sent");
            self.unschedule(id);
            return Ok(Processed::Recorded { change, alerted: false });
        }

        let alerted = match change {
            Some(change) => {
                self.alerts.transition(monitor, change, result);
                true
            }
            None if monitor.status == MonitorStatus::Down && !result.is_up() => {
                self.alerts.still_down(monitor, result);
                true
            }
            None => false,
        };

        Ok(Processed::Recorded { change, alerted })
    }

    fn unschedule(&self, id: uuid::Uuid) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.unschedule(id);
        }
    }
}
