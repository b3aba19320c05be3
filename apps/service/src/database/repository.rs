use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{Monitor, millis_to_timestamp, timestamp_to_millis};
use crate::alerts::NotificationPreferences;
use crate::history::HistoryStore;
use crate::monitoring::state::MonitorState;
use crate::monitoring::types::{CheckResult, ErrorKind, StatusTransition};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Monitor entities and their transition log
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Persist the configuration fields of a monitor. Check state is left
    /// alone so an edit never races a result being applied.
    async fn update_monitor(&self, monitor: &Monitor) -> Result<bool>;

    /// Persist the outcome of a check. `status_changed_at` is only written
    /// when set. Returns false when the monitor no longer exists.
    async fn update_check_state(
        &self,
        id: Uuid,
        state: MonitorState,
        checked_at: DateTime<Utc>,
        status_changed_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Pausing stamps `paused_at` with the current time, resuming clears it
    async fn set_paused(&self, id: Uuid, paused: bool) -> Result<bool>;

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>>;

    async fn list_monitors(&self) -> Result<Vec<Monitor>>;

    async fn monitors_for_owner(&self, owner_id: &str) -> Result<Vec<Monitor>>;

    /// Every monitor that is not paused
    async fn active_monitors(&self) -> Result<Vec<Monitor>>;

    /// Delete a monitor together with its results and transitions
    async fn delete_monitor(&self, id: Uuid) -> Result<bool>;

    async fn record_transition(&self, transition: &StatusTransition) -> Result<()>;

    /// Most recent transitions first
    async fn transitions(&self, id: Uuid, limit: usize) -> Result<Vec<StatusTransition>>;

    /// Alert channels an owner opted into, `None` if never set
    async fn notification_preferences(&self, owner_id: &str) -> Result<Option<NotificationPreferences>>;

    async fn set_notification_preferences(
        &self,
        owner_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<()>;
}

/// Full storage backend used by the engine
pub trait Database: MonitorRepository + HistoryStore {}

impl<T: MonitorRepository + HistoryStore> Database for T {}

const MONITOR_COLUMNS: &str = "id, owner_id, name, url, method, interval_seconds, timeout_seconds, \
     max_retries, expected_status_code, failure_threshold, is_paused, status, last_checked_at, \
     consecutive_failures, status_changed_at, created_at, updated_at, description, paused_at";

const RESULT_COLUMNS: &str = "monitor_id, started_at, timestamp, outcome, response_time_ms, http_status, \
     error_kind, error_message, attempts";

/// LibSQL database implementation
pub struct LibsqlDatabase {
    pool: LibsqlPool,
}

impl LibsqlDatabase {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, filter: &str, args: Vec<libsql::Value>) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors {filter} ORDER BY created_at, id");
        let mut rows = conn.query(&sql, args).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let method: String = row.get(4)?;
    let status: String = row.get(11)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        method: method.parse()?,
        interval_seconds: row.get::<i64>(5)? as u64,
        timeout_seconds: row.get::<i64>(6)? as u64,
        max_retries: row.get::<i64>(7)? as u32,
        expected_status_code: row.get::<i64>(8)? as u16,
        failure_threshold: row.get::<i64>(9)? as u32,
        is_paused: row.get::<i64>(10)? != 0,
        status: status.parse()?,
        last_checked_at: row.get::<Option<i64>>(12)?.map(millis_to_timestamp),
        consecutive_failures: row.get::<i64>(13)? as u32,
        status_changed_at: row.get::<Option<i64>>(14)?.map(millis_to_timestamp),
        created_at: millis_to_timestamp(row.get(15)?),
        updated_at: millis_to_timestamp(row.get(16)?),
        description: row.get(17)?,
        paused_at: row.get::<Option<i64>>(18)?.map(millis_to_timestamp),
    })
}

fn result_from_row(row: &Row) -> Result<CheckResult> {
    let monitor_id: String = row.get(0)?;
    let outcome: String = row.get(3)?;
    let http_status = row.get::<Option<i64>>(5)?.map(|v| v as u16);
    let error = match row.get::<Option<String>>(6)? {
        Some(label) => Some(
            ErrorKind::from_parts(&label, row.get(7)?, http_status)
                .with_context(|| format!("unknown error kind '{label}' in check_results"))?,
        ),
        None => None,
    };

    Ok(CheckResult {
        monitor_id: Uuid::parse_str(&monitor_id)?,
        started_at: millis_to_timestamp(row.get(1)?),
        timestamp: millis_to_timestamp(row.get(2)?),
        outcome: outcome.parse()?,
        response_time_ms: row.get::<Option<i64>>(4)?.map(|v| v as u64),
        http_status,
        error,
        attempts: row.get::<i64>(8)? as u32,
    })
}

#[async_trait]
impl MonitorRepository for LibsqlDatabase {
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &format!(
                "INSERT INTO monitors ({MONITOR_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                monitor.id.to_string(),
                monitor.owner_id.clone(),
                monitor.name.clone(),
                monitor.url.clone(),
                monitor.method.to_string(),
                monitor.interval_seconds as i64,
                monitor.timeout_seconds as i64,
                monitor.max_retries as i64,
                monitor.expected_status_code as i64,
                monitor.failure_threshold as i64,
                monitor.is_paused as i64,
                monitor.status.to_string(),
                monitor.last_checked_at.map(timestamp_to_millis),
                monitor.consecutive_failures as i64,
                monitor.status_changed_at.map(timestamp_to_millis),
                timestamp_to_millis(monitor.created_at),
                timestamp_to_millis(monitor.updated_at),
                monitor.description.clone(),
                monitor.paused_at.map(timestamp_to_millis)
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET name = ?, description = ?, url = ?, method = ?, interval_seconds = ?, \
                 timeout_seconds = ?, max_retries = ?, expected_status_code = ?, failure_threshold = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.description.clone(),
                    monitor.url.clone(),
                    monitor.method.to_string(),
                    monitor.interval_seconds as i64,
                    monitor.timeout_seconds as i64,
                    monitor.max_retries as i64,
                    monitor.expected_status_code as i64,
                    monitor.failure_threshold as i64,
                    timestamp_to_millis(monitor.updated_at),
                    monitor.id.to_string()
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn update_check_state(
        &self,
        id: Uuid,
        state: MonitorState,
        checked_at: DateTime<Utc>,
        status_changed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET status = ?, consecutive_failures = ?, last_checked_at = ?, \
                 status_changed_at = COALESCE(?, status_changed_at) WHERE id = ?",
                params![
                    state.status.to_string(),
                    state.consecutive_failures as i64,
                    timestamp_to_millis(checked_at),
                    status_changed_at.map(timestamp_to_millis),
                    id.to_string()
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn set_paused(&self, id: Uuid, paused: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_millis(Utc::now());
        let changed = conn
            .execute(
                "UPDATE monitors SET is_paused = ?, paused_at = ?, updated_at = ? WHERE id = ?",
                params![paused as i64, paused.then_some(now), now, id.to_string()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        let mut monitors =
            self.query_monitors("WHERE id = ?", vec![libsql::Value::Text(id.to_string())]).await?;
        Ok(monitors.pop())
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        self.query_monitors("", Vec::new()).await
    }

    async fn monitors_for_owner(&self, owner_id: &str) -> Result<Vec<Monitor>> {
        self.query_monitors("WHERE owner_id = ?", vec![libsql::Value::Text(owner_id.to_string())]).await
    }

    async fn active_monitors(&self) -> Result<Vec<Monitor>> {
        self.query_monitors("WHERE is_paused = 0", Vec::new()).await
    }

    async fn delete_monitor(&self, id: Uuid) -> Result<bool> {
        let conn = self.get_conn().await?;
        let id = id.to_string();

        let tx = conn.transaction().await?;
        tx.execute("DELETE FROM check_results WHERE monitor_id = ?", params![id.clone()]).await?;
        tx.execute("DELETE FROM status_transitions WHERE monitor_id = ?", params![id.clone()]).await?;
        let deleted = tx.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;
        tx.commit().await?;

        Ok(deleted > 0)
    }

    async fn record_transition(&self, transition: &StatusTransition) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO status_transitions (monitor_id, from_status, to_status, at) VALUES (?, ?, ?, ?)",
            params![
                transition.monitor_id.to_string(),
                transition.from.to_string(),
                transition.to.to_string(),
                timestamp_to_millis(transition.at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn transitions(&self, id: Uuid, limit: usize) -> Result<Vec<StatusTransition>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_id, from_status, to_status, at FROM status_transitions \
                 WHERE monitor_id = ? ORDER BY at DESC, id DESC LIMIT ?",
                params![id.to_string(), limit as i64],
            )
            .await?;

        let mut transitions = Vec::new();
        while let Some(row) = rows.next().await? {
            let monitor_id: String = row.get(0)?;
            let from: String = row.get(1)?;
            let to: String = row.get(2)?;
            transitions.push(StatusTransition {
                monitor_id: Uuid::parse_str(&monitor_id)?,
                from: from.parse()?,
                to: to.parse()?,
                at: millis_to_timestamp(row.get(3)?),
            });
        }
        Ok(transitions)
    }

    async fn notification_preferences(&self, owner_id: &str) -> Result<Option<NotificationPreferences>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT email, sms, telegram, webhook FROM notification_preferences WHERE owner_id = ?",
                params![owner_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(NotificationPreferences {
                email: row.get::<i64>(0)? != 0,
                sms: row.get::<i64>(1)? != 0,
                telegram: row.get::<i64>(2)? != 0,
                webhook: row.get::<i64>(3)? != 0,
            })),
            None => Ok(None),
        }
    }

    async fn set_notification_preferences(
        &self,
        owner_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_preferences (owner_id, email, sms, telegram, webhook, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(owner_id) DO UPDATE SET email = excluded.email, sms = excluded.sms, \
             telegram = excluded.telegram, webhook = excluded.webhook, updated_at = excluded.updated_at",
            params![
                owner_id.to_string(),
                preferences.email as i64,
                preferences.sms as i64,
                preferences.telegram as i64,
                preferences.webhook as i64,
                timestamp_to_millis(Utc::now())
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for LibsqlDatabase {
    async fn append(&self, result: &CheckResult) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &format!("INSERT INTO check_results ({RESULT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                result.monitor_id.to_string(),
                timestamp_to_millis(result.started_at),
                timestamp_to_millis(result.timestamp),
                result.outcome.to_string(),
                result.response_time_ms.map(|v| v as i64),
                result.http_status.map(|v| v as i64),
                result.error.as_ref().map(|e| e.label().to_string()),
                result.error.as_ref().and_then(|e| e.message()).map(str::to_string),
                result.attempts as i64
            ],
        )
        .await?;
        Ok(())
    }

    async fn results_between(
        &self,
        monitor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLUMNS} FROM check_results \
                     WHERE monitor_id = ? AND timestamp >= ? AND timestamp < ? ORDER BY timestamp, id"
                ),
                params![monitor_id.to_string(), timestamp_to_millis(from), timestamp_to_millis(to)],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(result_from_row(&row)?);
        }
        Ok(results)
    }

    async fn latest_result(&self, monitor_id: Uuid) -> Result<Option<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLUMNS} FROM check_results WHERE monitor_id = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![monitor_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(result_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM check_results WHERE timestamp < ?", params![timestamp_to_millis(cutoff)])
            .await?;
        Ok(deleted)
    }
}
