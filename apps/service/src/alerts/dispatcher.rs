use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::senders::AlertSink;
use super::{Alert, AlertKind, NotificationPreferences};
use crate::config::AlertsConfig;
use crate::database::Database;
use crate::database::models::Monitor;
use crate::monitoring::state::StateChange;
use crate::monitoring::types::{CheckResult, MonitorStatus};

/// Delivery and re-notification settings
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Tries per sink before giving up on an alert
    pub attempts: u32,
    pub retry_delay: Duration,
    /// Re-send "still down" alerts this often, `None` disables
    pub renotify_interval: Option<Duration>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from_config(&AlertsConfig::default())
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &AlertsConfig) -> Self {
        Self {
            attempts: config.dispatch_attempts.max(1),
            retry_delay: Duration::from_millis(config.dispatch_retry_ms),
            renotify_interval: config.renotify_interval_secs.map(Duration::from_secs),
        }
    }
}

/// Work items for the dispatcher task
#[derive(Debug)]
enum AlertEvent {
    Transition { monitor: Box<Monitor>, change: StateChange, result: Box<CheckResult> },
    StillDown { monitor: Box<Monitor>, result: Box<CheckResult> },
    Test { monitor: Box<Monitor>, reply: oneshot::Sender<bool> },
    Forget(Uuid),
}

/// Cloneable handle feeding the dispatcher task.
///
/// Events are handled one at a time in submission order, so a monitor's
/// recovery alert can never overtake its down alert.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    events: mpsc::UnboundedSender<AlertEvent>,
}

impl AlertQueue {
    pub fn transition(&self, monitor: Monitor, change: StateChange, result: CheckResult) {
        self.send(AlertEvent::Transition {
            monitor: Box::new(monitor),
            change,
            result: Box::new(result),
        });
    }

    /// A failed check of a monitor that is already down
    pub fn still_down(&self, monitor: Monitor, result: CheckResult) {
        self.send(AlertEvent::StillDown { monitor: Box::new(monitor), result: Box::new(result) });
    }

    /// Deliver a test alert, returning whether any sink accepted it
    pub async fn test(&self, monitor: Monitor) -> bool {
        let (reply, delivered) = oneshot::channel();
        self.send(AlertEvent::Test { monitor: Box::new(monitor), reply });
        delivered.await.unwrap_or(false)
    }

    /// Drop the episode of a deleted monitor
    pub fn forget(&self, monitor_id: Uuid) {
        self.send(AlertEvent::Forget(monitor_id));
    }

    fn send(&self, event: AlertEvent) {
        if self.events.send(event).is_err() {
            warn!("Alert dispatcher is not running, dropping alert event");
        }
    }
}

/// State of the outage a monitor is currently in
#[derive(Debug, Clone, Copy)]
struct DownEpisode {
    /// Whether at least one sink accepted the down alert
    notified: bool,
    last_notified: Instant,
}

/// Turns status transitions into alerts, at most one down and one recovery
/// alert per down-episode.
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    policy: DispatchPolicy,
    episodes: HashMap<Uuid, DownEpisode>,
    /// Source of owner preferences and of the monitor's current pause state
    database: Option<Arc<dyn Database>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, policy: DispatchPolicy) -> Self {
        Self { sinks, policy, episodes: HashMap::new(), database: None }
    }

    /// Re-read monitors before alerting and honour owner channel preferences
    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Register monitors that were already down and notified before a restart
    pub fn seed_down_episodes(&mut self, monitor_ids: impl IntoIterator<Item = Uuid>) {
        let now = Instant::now();
        for id in monitor_ids {
            self.episodes.insert(id, DownEpisode { notified: true, last_notified: now });
        }
    }

    /// Handle a status transition, returning the kind of alert sent, if any
    pub async fn on_transition(
        &mut self,
        monitor: &Monitor,
        change: StateChange,
        result: &CheckResult,
    ) -> Option<AlertKind> {
        match change.to {
            MonitorStatus::Down => {
                if self.is_withdrawn(monitor.id).await {
                    info!(monitor = %monitor.id, "Monitor paused or deleted before its down alert went out");
                    self.episodes
                        .insert(monitor.id, DownEpisode { notified: false, last_notified: Instant::now() });
                    return None;
                }
                let alert = Alert::new(AlertKind::Down, monitor.clone(), Some(result.clone()));
                let notified = self.deliver(&alert).await;
                self.episodes.insert(monitor.id, DownEpisode { notified, last_notified: Instant::now() });
                Some(AlertKind::Down)
            }
            MonitorStatus::Up => match self.episodes.remove(&monitor.id) {
                Some(episode) if episode.notified => {
                    if self.is_withdrawn(monitor.id).await {
                        info!(monitor = %monitor.id, "Monitor paused or deleted, recovery alert dropped");
                        return None;
                    }
                    let alert = Alert::new(AlertKind::Recovery, monitor.clone(), Some(result.clone()));
                    self.deliver(&alert).await;
                    Some(AlertKind::Recovery)
                }
                Some(_) => {
                    info!(monitor = %monitor.id, "Monitor recovered, down alert was never delivered so no recovery is sent");
                    None
                }
                None => {
                    debug!(monitor = %monitor.id, from = %change.from, "Monitor is up, no outage to recover from");
                    None
                }
            },
            MonitorStatus::Pending => None,
        }
    }

    /// Re-notify about an ongoing outage once the re-notification interval passed
    pub async fn on_still_down(&mut self, monitor: &Monitor, result: &CheckResult) -> Option<AlertKind> {
        let interval = self.policy.renotify_interval?;
        let episode = self.episodes.get(&monitor.id).copied()?;
        if !episode.notified || episode.last_notified.elapsed() < interval {
            return None;
        }
        if self.is_withdrawn(monitor.id).await {
            debug!(monitor = %monitor.id, "Monitor paused or deleted, no reminder sent");
            return None;
        }

        let alert = Alert::new(AlertKind::StillDown, monitor.clone(), Some(result.clone()));
        if self.deliver(&alert).await {
            if let Some(episode) = self.episodes.get_mut(&monitor.id) {
                episode.last_notified = Instant::now();
            }
        }
        Some(AlertKind::StillDown)
    }

    pub async fn send_test(&self, monitor: &Monitor) -> bool {
        self.deliver(&Alert::new(AlertKind::Test, monitor.clone(), None)).await
    }

    pub fn forget(&mut self, monitor_id: Uuid) {
        self.episodes.remove(&monitor_id);
    }

    /// True when the monitor was paused or deleted after the event was queued.
    /// Storage errors count as still active.
    async fn is_withdrawn(&self, monitor_id: Uuid) -> bool {
        let Some(database) = &self.database else {
            return false;
        };
        match database.get_monitor(monitor_id).await {
            Ok(Some(current)) => !current.is_active(),
            Ok(None) => true,
            Err(e) => {
                warn!(monitor = %monitor_id, "Failed to re-read monitor before alerting: {:#}", e);
                false
            }
        }
    }

    async fn preferences(&self, owner_id: &str) -> NotificationPreferences {
        let Some(database) = &self.database else {
            return NotificationPreferences::default();
        };
        match database.notification_preferences(owner_id).await {
            Ok(preferences) => preferences.unwrap_or_default(),
            Err(e) => {
                warn!(owner = owner_id, "Failed to load notification preferences: {:#}", e);
                NotificationPreferences::default()
            }
        }
    }

    /// Hand the alert to every sink on a channel the owner enabled,
    /// concurrently. True when at least one accepted it.
    async fn deliver(&self, alert: &Alert) -> bool {
        let preferences = self.preferences(&alert.monitor.owner_id).await;
        let mut alert = alert.clone();
        alert.channels = preferences.enabled();

        let sinks: Vec<_> = self.sinks.iter().filter(|sink| preferences.allows(sink.channel())).collect();
        if sinks.is_empty() {
            info!(
                monitor = %alert.monitor.id,
                owner = %alert.monitor.owner_id,
                kind = %alert.kind,
                "Owner has every alert channel disabled"
            );
            return false;
        }

        let deliveries = sinks.into_iter().map(|sink| self.deliver_to(sink.as_ref(), &alert));
        let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();

        if delivered == 0 {
            error!(
                monitor = %alert.monitor.id,
                kind = %alert.kind,
                "Alert could not be delivered to any sink"
            );
        }
        delivered > 0
    }

    async fn deliver_to(&self, sink: &dyn AlertSink, alert: &Alert) -> bool {
        for attempt in 1..=self.policy.attempts {
            match sink.on_alert(alert).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        sink = sink.name(),
                        monitor = %alert.monitor.id,
                        attempt,
                        "Alert delivery failed: {}",
                        e
                    );
                    if attempt < self.policy.attempts {
                        sleep(self.policy.retry_delay).await;
                        if alert.kind != AlertKind::Test && self.is_withdrawn(alert.monitor.id).await {
                            debug!(
                                sink = sink.name(),
                                monitor = %alert.monitor.id,
                                "Monitor paused or deleted, retries stopped"
                            );
                            return false;
                        }
                    }
                }
            }
        }
        false
    }

    /// Spawn the dispatcher task
    pub fn spawn(self) -> (AlertQueue, JoinHandle<()>) {
        let (events, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (AlertQueue { events }, task)
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<AlertEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                AlertEvent::Transition { monitor, change, result } => {
                    self.on_transition(&monitor, change, &result).await;
                }
                AlertEvent::StillDown { monitor, result } => {
                    self.on_still_down(&monitor, &result).await;
                }
                AlertEvent::Test { monitor, reply } => {
                    let delivered = self.send_test(&monitor).await;
                    let _ = reply.send(delivered);
                }
                AlertEvent::Forget(id) => self.forget(id),
            }
        }
        debug!("Alert dispatcher stopped");
    }
}
