/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Manages the lifecycle of the scheduler, result processor and alert dispatcher
/// - Exposes the monitor management operations
/// - Keeps the scheduler in sync with the database
/// - Runs retention cleanup in the background
pub mod monitors;
pub mod results;
pub mod retention;

#[cfg(test)]
mod tests;

pub use results::{Processed, ResultProcessor};
pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{AlertDispatcher, AlertQueue, AlertSink, DispatchPolicy};
use crate::config::Config;
use crate::database::Database;
use crate::monitoring::scheduler::{ScheduledMonitor, SchedulerHandle, SchedulerOptions};
use crate::monitoring::types::{CheckResult, MonitorStatus};
use crate::monitoring::{MonitoringExecutor, MonitoringScheduler};

/// Capacity of the channel between check workers and the result processor
const RESULT_QUEUE_SIZE: usize = 256;

/// Main orchestrator for the pulse service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    /// Absent when running without a scheduler (management CLI)
    scheduler: Option<SchedulerHandle>,
    alerts: AlertQueue,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start the monitoring engine: schedule every active monitor and spawn
    /// the result processor, the alert dispatcher and the maintenance tasks.
    pub async fn start(
        config: Config,
        database: Arc<dyn Database>,
        executor: Arc<MonitoringExecutor>,
        sinks: Vec<Arc<dyn AlertSink>>,
    ) -> Result<Arc<Self>> {
        info!("Starting pulse orchestrator...");
        let config = Arc::new(config);

        let monitors = database.list_monitors().await?;
        let mut dispatcher = AlertDispatcher::new(sinks, DispatchPolicy::from_config(&config.alerts))
            .with_database(Arc::clone(&database));
        // Outages in progress at shutdown were already notified
        dispatcher.seed_down_episodes(
            monitors.iter().filter(|m| m.status == MonitorStatus::Down).map(|m| m.id),
        );
        let (alerts, dispatcher_task) = dispatcher.spawn();

        let (result_tx, result_rx) = mpsc::channel::<CheckResult>(RESULT_QUEUE_SIZE);
        let scheduler = MonitoringScheduler::new(
            executor,
            result_tx,
            SchedulerOptions::from_config(&config.scheduler),
        );
        let (scheduler, scheduler_task) = scheduler.start();

        let active: Vec<_> = monitors.iter().filter(|m| m.is_active()).collect();
        info!("Scheduling {} of {} monitors", active.len(), monitors.len());
        for monitor in active {
            scheduler.schedule(ScheduledMonitor::from(monitor));
        }

        let processor =
            ResultProcessor::new(Arc::clone(&database), Some(scheduler.clone()), alerts.clone());
        let mut task_handles = vec![dispatcher_task, scheduler_task, processor.spawn(result_rx)];

        let retention_policy = RetentionPolicy::from_config(&config.retention);
        info!("Retention policy: results kept {}d", retention_policy.result_days);
        task_handles
            .push(RetentionCleanup::new(Arc::clone(&database), retention_policy).start_periodic_cleanup());

        if config.scheduler.reload_interval_secs > 0 {
            task_handles.push(spawn_monitor_reload(
                Arc::clone(&database),
                scheduler.clone(),
                Duration::from_secs(config.scheduler.reload_interval_secs),
            ));
        }

        info!("Orchestrator started successfully");
        Ok(Arc::new(Self {
            config,
            database,
            scheduler: Some(scheduler),
            alerts,
            task_handles: Mutex::new(task_handles),
        }))
    }

    /// Management-only orchestrator: no checks are scheduled, but monitor
    /// operations, history queries and test alerts work.
    pub fn offline(config: Config, database: Arc<dyn Database>, sinks: Vec<Arc<dyn AlertSink>>) -> Arc<Self> {
        let config = Arc::new(config);
        let dispatcher = AlertDispatcher::new(sinks, DispatchPolicy::from_config(&config.alerts))
            .with_database(Arc::clone(&database));
        let (alerts, dispatcher_task) = dispatcher.spawn();

        Arc::new(Self {
            config,
            database,
            scheduler: None,
            alerts,
            task_handles: Mutex::new(vec![dispatcher_task]),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_scheduling(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Stop scheduling and background tasks. In-flight checks are dropped.
    pub fn shutdown(&self) {
        info!("Shutting down orchestrator");
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }

        let handles = match self.task_handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            handle.abort();
        }
    }
}

/// Periodically re-read active monitors so changes made by another process
/// (the management CLI) reach the scheduler.
fn spawn_monitor_reload(
    database: Arc<dyn Database>,
    scheduler: SchedulerHandle,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately and startup already scheduled everything
        interval.tick().await;

        loop {
            interval.tick().await;

            match database.active_monitors().await {
                Ok(monitors) => {
                    let ids: HashSet<_> = monitors.iter().map(|m| m.id).collect();
                    for monitor in &monitors {
                        scheduler.schedule(ScheduledMonitor::from(monitor));
                    }
                    scheduler.retain(ids);
                    debug!("Reloaded {} active monitors", monitors.len());
                }
                Err(e) => warn!("Failed to reload monitors: {}", e),
            }
        }
    })
}
