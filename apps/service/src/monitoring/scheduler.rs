//! Due-time scheduler for monitor checks.
//!
//! A single actor task owns the due-time heap and every per-monitor entry;
//! the rest of the engine talks to it through [`SchedulerHandle`] commands,
//! so "pop due monitor" can never race an edit or a delete. Probes run on
//! spawned tasks gated by a semaphore (the worker pool). A monitor is
//! rescheduled only after its in-flight check completes, at
//! `completion + interval`.

use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::MonitoringExecutor;
use super::types::{CheckResult, CheckSettings};
use crate::config::SchedulerConfig;

/// Monitor configuration for scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMonitor {
    pub id: Uuid,
    pub settings: CheckSettings,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum number of concurrently running checks
    pub workers: usize,
    /// Upper bound of the random delay before a new monitor's first check
    pub startup_jitter: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            startup_jitter: Duration::from_millis(config.startup_jitter_ms),
        }
    }
}

#[derive(Debug)]
enum Command {
    Upsert(ScheduledMonitor),
    Remove(Uuid),
    Retain(HashSet<Uuid>),
    Shutdown,
}

/// Cloneable handle used to feed the scheduler loop
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Add a monitor, or update the settings of one already scheduled.
    ///
    /// Updated settings take effect at the monitor's next reschedule.
    pub fn schedule(&self, monitor: ScheduledMonitor) {
        self.send(Command::Upsert(monitor));
    }

    /// Stop scheduling a monitor. An in-flight check is not aborted.
    pub fn unschedule(&self, id: Uuid) {
        self.send(Command::Remove(id));
    }

    /// Drop every scheduled monitor whose id is not in `ids`
    pub fn retain(&self, ids: HashSet<Uuid>) {
        self.send(Command::Retain(ids));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!("Scheduler loop is not running, dropping command: {:?}", e.0);
        }
    }
}

#[derive(Debug)]
struct Entry {
    settings: CheckSettings,
    /// Ticket of the live heap item, `None` while in flight
    ticket: Option<u64>,
}

/// Due-time bookkeeping, owned by the scheduler loop
#[derive(Debug, Default)]
struct DueQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, Uuid)>>,
    entries: HashMap<Uuid, Entry>,
    in_flight: HashSet<Uuid>,
    next_ticket: u64,
}

impl DueQueue {
    fn upsert(&mut self, monitor: ScheduledMonitor, first_due: Instant) {
        if let Some(entry) = self.entries.get_mut(&monitor.id) {
            entry.settings = monitor.settings;
            return;
        }

        self.entries.insert(monitor.id, Entry { settings: monitor.settings, ticket: None });
        // An in-flight check of a removed-then-readded monitor reschedules it on completion
        if !self.in_flight.contains(&monitor.id) {
            self.push(monitor.id, first_due);
        }
    }

    fn remove(&mut self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn retain(&mut self, ids: &HashSet<Uuid>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| ids.contains(id));
        before - self.entries.len()
    }

    fn push(&mut self, id: Uuid, due: Instant) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        self.next_ticket += 1;
        entry.ticket = Some(self.next_ticket);
        self.heap.push(Reverse((due, self.next_ticket, id)));
    }

    fn is_live(&self, ticket: u64, id: &Uuid) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.ticket == Some(ticket))
    }

    /// Earliest live due time, discarding stale heap items on the way
    fn next_due(&mut self) -> Option<Instant> {
        while let Some(Reverse((due, ticket, id))) = self.heap.peek().copied() {
            if self.is_live(ticket, &id) {
                return Some(due);
            }
            self.heap.pop();
        }
        None
    }

    /// Take every monitor due at `now` and mark it in flight
    fn pop_due(&mut self, now: Instant) -> Vec<ScheduledMonitor> {
        let mut due_monitors = Vec::new();

        while let Some(Reverse((due, ticket, id))) = self.heap.peek().copied() {
            if due > now {
                break;
            }
            self.heap.pop();

            if !self.is_live(ticket, &id) || self.in_flight.contains(&id) {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.ticket = None;
                self.in_flight.insert(id);
                due_monitors.push(ScheduledMonitor { id, settings: entry.settings.clone() });
            }
        }

        due_monitors
    }

    /// Clear the in-flight flag and reschedule from the completion time
    fn complete(&mut self, id: Uuid, now: Instant) {
        self.in_flight.remove(&id);
        if let Some(interval) = self.entries.get(&id).map(|entry| entry.settings.interval) {
            self.push(id, now + interval);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Monitoring scheduler - dispatches due checks to a bounded worker pool
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    result_tx: mpsc::Sender<CheckResult>,
    options: SchedulerOptions,
}

impl MonitoringScheduler {
    pub fn new(
        executor: Arc<MonitoringExecutor>,
        result_tx: mpsc::Sender<CheckResult>,
        options: SchedulerOptions,
    ) -> Self {
        Self { executor, result_tx, options }
    }

    /// Spawn the scheduler loop
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(command_rx));
        (SchedulerHandle { commands }, task)
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let workers = Arc::new(Semaphore::new(self.options.workers));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Uuid>();
        let mut queue = DueQueue::default();

        info!(workers = self.options.workers, "Scheduler started");

        loop {
            let next_due = queue.next_due();
            let wake_at = next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Upsert(monitor)) => {
                        let first_due = Instant::now() + self.jitter();
                        debug!(monitor = %monitor.id, "Scheduling monitor");
                        queue.upsert(monitor, first_due);
                    }
                    Some(Command::Remove(id)) => {
                        if queue.remove(id) {
                            debug!(monitor = %id, "Unscheduled monitor");
                        }
                    }
                    Some(Command::Retain(ids)) => {
                        let removed = queue.retain(&ids);
                        if removed > 0 {
                            debug!(removed, scheduled = queue.len(), "Dropped monitors no longer active");
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(id) = done_rx.recv() => {
                    queue.complete(id, Instant::now());
                }
                _ = sleep_until(wake_at), if next_due.is_some() => {
                    for monitor in queue.pop_due(Instant::now()) {
                        self.dispatch(monitor, Arc::clone(&workers), done_tx.clone());
                    }
                }
            }
        }

        workers.close();
        info!("Scheduler stopped");
    }

    fn dispatch(&self, monitor: ScheduledMonitor, workers: Arc<Semaphore>, done_tx: mpsc::UnboundedSender<Uuid>) {
        let executor = Arc::clone(&self.executor);
        let result_tx = self.result_tx.clone();

        tokio::spawn(async move {
            // A closed pool means the scheduler shut down
            let Ok(permit) = workers.acquire_owned().await else {
                return;
            };

            let result = executor.execute_isolated(monitor.id, monitor.settings).await;
            drop(permit);

            if let Err(e) = result_tx.send(result).await {
                warn!(monitor = %monitor.id, "Failed to hand over check result: {}", e);
            }
            let _ = done_tx.send(monitor.id);
        });
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.options.startup_jitter.as_millis() as u64;
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
        }
    }
}
