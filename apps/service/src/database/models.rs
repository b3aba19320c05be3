use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::MonitorDefaults;
use crate::error::MonitorError;
use crate::monitoring::scheduler::ScheduledMonitor;
use crate::monitoring::state::MonitorState;
use crate::monitoring::types::{CheckSettings, MonitorStatus, ProbeMethod};
use crate::monitoring::validation;

/// Monitor model - a URL checked periodically, with its current health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    /// Opaque reference to the owning user
    pub owner_id: String,
    pub name: String,
    /// Free-form note shown alongside the monitor
    pub description: Option<String>,
    pub url: String,
    pub method: ProbeMethod,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub expected_status_code: u16,
    pub failure_threshold: u32,
    pub is_paused: bool,
    /// When the current pause began, `None` while active
    pub paused_at: Option<DateTime<Utc>>,

    pub status: MonitorStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub status_changed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Resolved check configuration, as handed to the scheduler
    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            url: self.url.clone(),
            method: self.method,
            interval: Duration::from_secs(self.interval_seconds),
            timeout: Duration::from_secs(self.timeout_seconds),
            max_retries: self.max_retries,
            expected_status: self.expected_status_code,
        }
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::new(self.status, self.consecutive_failures)
    }

    /// Paused monitors are never scheduled
    pub fn is_active(&self) -> bool {
        !self.is_paused
    }

    /// Check every user-editable field
    pub fn validate(&self) -> Result<(), MonitorError> {
        validation::validate_name(&self.name)?;
        if let Some(description) = &self.description {
            validation::validate_description(description)?;
        }
        validation::validate_url(&self.url)?;
        validation::validate_check_interval(self.interval_seconds)?;
        validation::validate_timeout(self.timeout_seconds, self.interval_seconds)?;
        validation::validate_max_retries(self.max_retries)?;
        validation::validate_expected_status(self.expected_status_code)?;
        validation::validate_failure_threshold(self.failure_threshold)
    }
}

impl From<&Monitor> for ScheduledMonitor {
    fn from(monitor: &Monitor) -> Self {
        ScheduledMonitor { id: monitor.id, settings: monitor.check_settings() }
    }
}

/// Request to register a new monitor. Unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMonitor {
    pub owner_id: String,
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub method: Option<ProbeMethod>,
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub expected_status_code: Option<u16>,
    pub failure_threshold: Option<u32>,
}

impl NewMonitor {
    pub fn new(owner_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { owner_id: owner_id.into(), url: url.into(), ..Default::default() }
    }

    /// Resolve defaults and validate, producing a `pending` monitor
    pub fn into_monitor(self, defaults: &MonitorDefaults) -> Result<Monitor, MonitorError> {
        let url = self.url.trim().to_string();
        validation::validate_url(&url)?;

        let interval_seconds = self.interval_seconds.unwrap_or(defaults.interval_seconds);
        // A default timeout never pushes an explicitly short interval into rejection
        let timeout_seconds = self
            .timeout_seconds
            .unwrap_or_else(|| defaults.timeout_seconds.min(interval_seconds.saturating_sub(1)));

        let name = match self.name {
            Some(name) => name.trim().to_string(),
            None => validation::derive_name(&url),
        };

        let now = Utc::now();
        let monitor = Monitor {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name,
            description: normalize_description(self.description),
            url,
            method: self.method.unwrap_or(defaults.method),
            interval_seconds,
            timeout_seconds,
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            expected_status_code: self.expected_status_code.unwrap_or(defaults.expected_status_code),
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            is_paused: false,
            paused_at: None,
            status: MonitorStatus::Pending,
            last_checked_at: None,
            consecutive_failures: 0,
            status_changed_at: None,
            created_at: now,
            updated_at: now,
        };

        monitor.validate()?;
        Ok(monitor)
    }
}

/// Partial update of a monitor's configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorPatch {
    pub name: Option<String>,
    /// An empty description clears it
    pub description: Option<String>,
    pub url: Option<String>,
    pub method: Option<ProbeMethod>,
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub expected_status_code: Option<u16>,
    pub failure_threshold: Option<u32>,
}

impl MonitorPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.url.is_none()
            && self.method.is_none()
            && self.interval_seconds.is_none()
            && self.timeout_seconds.is_none()
            && self.max_retries.is_none()
            && self.expected_status_code.is_none()
            && self.failure_threshold.is_none()
    }

    /// Apply the patch to a copy of `monitor`. The original is untouched if
    /// the patched monitor does not validate.
    pub fn apply_to(&self, monitor: &Monitor) -> Result<Monitor, MonitorError> {
        let mut patched = monitor.clone();

        if let Some(name) = &self.name {
            patched.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            patched.description = normalize_description(Some(description.clone()));
        }
        if let Some(url) = &self.url {
            patched.url = url.trim().to_string();
        }
        if let Some(method) = self.method {
            patched.method = method;
        }
        if let Some(interval) = self.interval_seconds {
            patched.interval_seconds = interval;
        }
        if let Some(timeout) = self.timeout_seconds {
            patched.timeout_seconds = timeout;
        }
        if let Some(retries) = self.max_retries {
            patched.max_retries = retries;
        }
        if let Some(status) = self.expected_status_code {
            patched.expected_status_code = status;
        }
        if let Some(threshold) = self.failure_threshold {
            patched.failure_threshold = threshold;
        }

        patched.validate()?;
        patched.updated_at = Utc::now();
        Ok(patched)
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

/// Convert a timestamp to unix milliseconds for storage
pub fn timestamp_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
