use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::Monitor;
use super::repository::MonitorRepository;
use crate::alerts::NotificationPreferences;
use crate::history::HistoryStore;
use crate::monitoring::state::MonitorState;
use crate::monitoring::types::{CheckResult, StatusTransition};

#[derive(Debug, Default)]
struct Inner {
    monitors: HashMap<Uuid, Monitor>,
    results: HashMap<Uuid, Vec<CheckResult>>,
    transitions: HashMap<Uuid, Vec<StatusTransition>>,
    preferences: HashMap<String, NotificationPreferences>,
}

/// Volatile storage backend, used for `:memory:` databases and tests
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    inner: RwLock<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut monitors: Vec<Monitor>) -> Vec<Monitor> {
    monitors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    monitors
}

#[async_trait]
impl MonitorRepository for MemoryDatabase {
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.monitors.contains_key(&monitor.id) {
            anyhow::bail!("monitor {} already exists", monitor.id);
        }
        inner.monitors.insert(monitor.id, monitor.clone());
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.monitors.get_mut(&monitor.id) else {
            return Ok(false);
        };

        stored.name = monitor.name.clone();
        stored.description = monitor.description.clone();
        stored.url = monitor.url.clone();
        stored.method = monitor.method;
        stored.interval_seconds = monitor.interval_seconds;
        stored.timeout_seconds = monitor.timeout_seconds;
        stored.max_retries = monitor.max_retries;
        stored.expected_status_code = monitor.expected_status_code;
        stored.failure_threshold = monitor.failure_threshold;
        stored.updated_at = monitor.updated_at;
        Ok(true)
    }

    async fn update_check_state(
        &self,
        id: Uuid,
        state: MonitorState,
        checked_at: DateTime<Utc>,
        status_changed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.monitors.get_mut(&id) else {
            return Ok(false);
        };

        stored.status = state.status;
        stored.consecutive_failures = state.consecutive_failures;
        stored.last_checked_at = Some(checked_at);
        if status_changed_at.is_some() {
            stored.status_changed_at = status_changed_at;
        }
        Ok(true)
    }

    async fn set_paused(&self, id: Uuid, paused: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.monitors.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        stored.is_paused = paused;
        stored.paused_at = paused.then_some(now);
        stored.updated_at = now;
        Ok(true)
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        Ok(self.inner.read().await.monitors.get(&id).cloned())
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        Ok(sorted(self.inner.read().await.monitors.values().cloned().collect()))
    }

    async fn monitors_for_owner(&self, owner_id: &str) -> Result<Vec<Monitor>> {
        let inner = self.inner.read().await;
        Ok(sorted(inner.monitors.values().filter(|m| m.owner_id == owner_id).cloned().collect()))
    }

    async fn active_monitors(&self) -> Result<Vec<Monitor>> {
        let inner = self.inner.read().await;
        Ok(sorted(inner.monitors.values().filter(|m| m.is_active()).cloned().collect()))
    }

    async fn delete_monitor(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.results.remove(&id);
        inner.transitions.remove(&id);
        Ok(inner.monitors.remove(&id).is_some())
    }

    async fn record_transition(&self, transition: &StatusTransition) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.transitions.entry(transition.monitor_id).or_default().push(transition.clone());
        Ok(())
    }

    async fn transitions(&self, id: Uuid, limit: usize) -> Result<Vec<StatusTransition>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transitions
            .get(&id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn notification_preferences(&self, owner_id: &str) -> Result<Option<NotificationPreferences>> {
        Ok(self.inner.read().await.preferences.get(owner_id).copied())
    }

    async fn set_notification_preferences(
        &self,
        owner_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<()> {
        self.inner.write().await.preferences.insert(owner_id.to_string(), *preferences);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryDatabase {
    async fn append(&self, result: &CheckResult) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.results.entry(result.monitor_id).or_default().push(result.clone());
        Ok(())
    }

    async fn results_between(
        &self,
        monitor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>> {
        let inner = self.inner.read().await;
        let mut results: Vec<CheckResult> = inner
            .results
            .get(&monitor_id)
            .map(|log| {
                log.iter().filter(|r| r.timestamp >= from && r.timestamp < to).cloned().collect()
            })
            .unwrap_or_default();
        results.sort_by_key(|r| r.timestamp);
        Ok(results)
    }

    async fn latest_result(&self, monitor_id: Uuid) -> Result<Option<CheckResult>> {
        let inner = self.inner.read().await;
        Ok(inner
            .results
            .get(&monitor_id)
            .and_then(|log| log.iter().max_by_key(|r| r.timestamp))
            .cloned())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut pruned = 0;
        for log in inner.results.values_mut() {
            let before = log.len();
            log.retain(|r| r.timestamp >= cutoff);
            pruned += (before - log.len()) as u64;
        }
        Ok(pruned)
    }
}
