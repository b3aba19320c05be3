//! Monitor management operations.
//!
//! Structural problems (bad input, unknown ids) are returned to the caller;
//! storage failures surface as `MonitorError::Storage`.

use tracing::{debug, info};
use uuid::Uuid;

use super::Orchestrator;
use crate::alerts::NotificationPreferences;
use crate::database::{Monitor, MonitorPatch, NewMonitor};
use crate::error::MonitorError;
use crate::history::{History, Window};
use crate::monitoring::scheduler::ScheduledMonitor;
use crate::monitoring::types::StatusTransition;

impl Orchestrator {
    /// Register a monitor and schedule its first check
    pub async fn create_monitor(&self, request: NewMonitor) -> Result<Monitor, MonitorError> {
        let monitor = request.into_monitor(&self.config.defaults)?;
        self.database.insert_monitor(&monitor).await?;
        self.schedule(&monitor);

        info!(
            target: "pulse::audit",
            monitor = %monitor.id,
            owner = %monitor.owner_id,
            url = %monitor.url,
            interval_seconds = monitor.interval_seconds,
            "Monitor created"
        );
        Ok(monitor)
    }

    pub async fn get_monitor(&self, id: Uuid) -> Result<Monitor, MonitorError> {
        self.database.get_monitor(id).await?.ok_or(MonitorError::NotFound(id))
    }

    /// Monitors of one owner, for the dashboard list view
    pub async fn get_monitors(&self, owner_id: &str) -> Result<Vec<Monitor>, MonitorError> {
        Ok(self.database.monitors_for_owner(owner_id).await?)
    }

    pub async fn list_monitors(&self) -> Result<Vec<Monitor>, MonitorError> {
        Ok(self.database.list_monitors().await?)
    }

    /// Stop checking a monitor. Pausing a paused monitor does nothing.
    pub async fn pause_monitor(&self, id: Uuid) -> Result<Monitor, MonitorError> {
        let monitor = self.get_monitor(id).await?;
        if monitor.is_paused {
            debug!(monitor = %id, "Monitor already paused");
            return Ok(monitor);
        }

        if !self.database.set_paused(id, true).await? {
            return Err(MonitorError::NotFound(id));
        }
        self.unschedule(id);
        let monitor = self.get_monitor(id).await?;

        info!(target: "pulse::audit", monitor = %id, "Monitor paused");
        Ok(monitor)
    }

    /// Resume checking a paused monitor. Resuming an active monitor does
    /// nothing and does not force a check.
    pub async fn resume_monitor(&self, id: Uuid) -> Result<Monitor, MonitorError> {
        let monitor = self.get_monitor(id).await?;
        if monitor.is_active() {
            debug!(monitor = %id, "Monitor already active");
            return Ok(monitor);
        }

        if !self.database.set_paused(id, false).await? {
            return Err(MonitorError::NotFound(id));
        }
        let monitor = self.get_monitor(id).await?;
        if monitor.is_active() {
            self.schedule(&monitor);
        }

        info!(target: "pulse::audit", monitor = %id, "Monitor resumed");
        Ok(monitor)
    }

    /// Change a monitor's configuration. Health state is kept.
    pub async fn edit_monitor(&self, id: Uuid, patch: MonitorPatch) -> Result<Monitor, MonitorError> {
        let current = self.get_monitor(id).await?;
        if patch.is_empty() {
            return Ok(current);
        }

        let patched = patch.apply_to(&current)?;
        if !self.database.update_monitor(&patched).await? {
            return Err(MonitorError::NotFound(id));
        }

        // Re-read so the returned state includes any result applied meanwhile
        let monitor = self.get_monitor(id).await?;
        if monitor.is_active() {
            self.schedule(&monitor);
        }

        info!(target: "pulse::audit", monitor = %id, url = %monitor.url, "Monitor edited");
        Ok(monitor)
    }

    /// Delete a monitor with its whole history
    pub async fn delete_monitor(&self, id: Uuid) -> Result<(), MonitorError> {
        self.unschedule(id);
        if !self.database.delete_monitor(id).await? {
            return Err(MonitorError::NotFound(id));
        }
        self.alerts.forget(id);

        info!(target: "pulse::audit", monitor = %id, "Monitor deleted");
        Ok(())
    }

    /// Raw points and statistics over a window ending now
    pub async fn get_history(&self, id: Uuid, window: Window) -> Result<History, MonitorError> {
        self.get_monitor(id).await?;
        Ok(self.database.query(id, window).await?)
    }

    /// Most recent status transitions first
    pub async fn get_transitions(&self, id: Uuid, limit: usize) -> Result<Vec<StatusTransition>, MonitorError> {
        self.get_monitor(id).await?;
        Ok(self.database.transitions(id, limit).await?)
    }

    /// Channel preferences of an owner, everything enabled if never set
    pub async fn get_notification_preferences(&self, owner_id: &str) -> Result<NotificationPreferences, MonitorError> {
        Ok(self.database.notification_preferences(owner_id).await?.unwrap_or_default())
    }

    pub async fn set_notification_preferences(
        &self,
        owner_id: &str,
        preferences: NotificationPreferences,
    ) -> Result<NotificationPreferences, MonitorError> {
        if owner_id.trim().is_empty() {
            return Err(MonitorError::invalid("Owner cannot be empty"));
        }
        self.database.set_notification_preferences(owner_id, &preferences).await?;

        info!(
            target: "pulse::audit",
            owner = owner_id,
            channels = ?preferences.enabled(),
            "Notification preferences updated"
        );
        Ok(preferences)
    }

    /// Send a test alert through every sink the owner enabled, returning
    /// whether any accepted it
    pub async fn send_test_alert(&self, id: Uuid) -> Result<bool, MonitorError> {
        let monitor = self.get_monitor(id).await?;
        Ok(self.alerts.test(monitor).await)
    }

    fn schedule(&self, monitor: &Monitor) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule(ScheduledMonitor::from(monitor));
        }
    }

    fn unschedule(&self, id: Uuid) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.unschedule(id);
        }
    }
}
