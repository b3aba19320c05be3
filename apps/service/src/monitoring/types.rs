use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Returned when a textual status, outcome or method cannot be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Health of a monitor as tracked by the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// No check has reached a verdict yet
    #[default]
    Pending,
    Up,
    Down,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Pending => write!(f, "pending"),
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
        }
    }
}

impl FromStr for MonitorStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MonitorStatus::Pending),
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            other => Err(ParseEnumError::new("monitor status", other)),
        }
    }
}

/// Definitive outcome of one scheduled check, after retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Up,
    Down,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Up => write!(f, "up"),
            CheckOutcome::Down => write!(f, "down"),
        }
    }
}

impl FromStr for CheckOutcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(CheckOutcome::Up),
            "down" => Ok(CheckOutcome::Down),
            other => Err(ParseEnumError::new("check outcome", other)),
        }
    }
}

/// Why a probe attempt counted as a failure.
///
/// All variants mean "the endpoint is unhealthy" to the state machine; they
/// are kept apart for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionError { message: String },
    UnexpectedStatus { status: u16 },
}

impl ErrorKind {
    /// Stable label used for storage
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionError { .. } => "connection_error",
            ErrorKind::UnexpectedStatus { .. } => "unexpected_status",
        }
    }

    /// Rebuild an error from its stored label and columns
    pub fn from_parts(label: &str, message: Option<String>, status: Option<u16>) -> Option<Self> {
        match label {
            "timeout" => Some(ErrorKind::Timeout),
            "connection_error" => {
                Some(ErrorKind::ConnectionError { message: message.unwrap_or_default() })
            }
            "unexpected_status" => status.map(|status| ErrorKind::UnexpectedStatus { status }),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorKind::ConnectionError { message } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "request timed out"),
            ErrorKind::ConnectionError { message } => write!(f, "connection error: {message}"),
            ErrorKind::UnexpectedStatus { status } => {
                write!(f, "unexpected status code {status}")
            }
        }
    }
}

/// HTTP method used by a probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    #[default]
    Get,
    Head,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Get => write!(f, "get"),
            ProbeMethod::Head => write!(f, "head"),
        }
    }
}

impl FromStr for ProbeMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(ProbeMethod::Get),
            "head" => Ok(ProbeMethod::Head),
            _ => Err(ParseEnumError::new("probe method", s)),
        }
    }
}

/// Everything a single probe attempt needs to know about its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub url: String,
    pub method: ProbeMethod,
    pub timeout: Duration,
    pub expected_status: u16,
}

/// Check configuration of one monitor, resolved when the check is dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSettings {
    pub url: String,
    pub method: ProbeMethod,
    pub interval: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub expected_status: u16,
}

impl CheckSettings {
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            url: self.url.clone(),
            method: self.method,
            timeout: self.timeout,
            expected_status: self.expected_status,
        }
    }
}

/// Outcome of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub http_status: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error: Option<ErrorKind>,
}

impl ProbeOutcome {
    pub fn up(http_status: u16, response_time_ms: u64) -> Self {
        Self {
            success: true,
            http_status: Some(http_status),
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn timeout() -> Self {
        Self { success: false, http_status: None, response_time_ms: None, error: Some(ErrorKind::Timeout) }
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            http_status: None,
            response_time_ms: None,
            error: Some(ErrorKind::ConnectionError { message: message.into() }),
        }
    }

    /// The endpoint answered, but not with the expected status
    pub fn unexpected_status(http_status: u16, response_time_ms: u64) -> Self {
        Self {
            success: false,
            http_status: Some(http_status),
            response_time_ms: Some(response_time_ms),
            error: Some(ErrorKind::UnexpectedStatus { status: http_status }),
        }
    }
}

/// Result of one definitive (post-retry) check. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// UUID of the monitor that was checked
    pub monitor_id: Uuid,

    /// When the first probe attempt started
    pub started_at: DateTime<Utc>,

    /// When the check completed
    pub timestamp: DateTime<Utc>,

    pub outcome: CheckOutcome,

    /// Wall-clock duration of the deciding attempt, if the endpoint answered
    pub response_time_ms: Option<u64>,

    pub http_status: Option<u16>,

    /// Diagnostic of the last failed attempt
    pub error: Option<ErrorKind>,

    /// Probe attempts spent on this check
    pub attempts: u32,
}

impl CheckResult {
    /// Create a new check result, completed now
    pub fn new(monitor_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            monitor_id,
            started_at,
            timestamp: Utc::now(),
            outcome: CheckOutcome::Down,
            response_time_ms: None,
            http_status: None,
            error: None,
            attempts: 1,
        }
    }

    /// Build the definitive result from the deciding probe attempt
    pub fn from_probe(
        monitor_id: Uuid,
        started_at: DateTime<Utc>,
        probe: ProbeOutcome,
        attempts: u32,
    ) -> Self {
        let result = Self::new(monitor_id, started_at).with_attempts(attempts);
        match probe.error {
            Some(error) if !probe.success => {
                result.failure(error, probe.http_status, probe.response_time_ms)
            }
            _ => result.success(probe.response_time_ms, probe.http_status),
        }
    }

    /// Mark the check as successful
    pub fn success(mut self, response_time_ms: Option<u64>, http_status: Option<u16>) -> Self {
        self.outcome = CheckOutcome::Up;
        self.response_time_ms = response_time_ms;
        self.http_status = http_status;
        self.error = None;
        self
    }

    /// Mark the check as failed
    pub fn failure(
        mut self,
        error: ErrorKind,
        http_status: Option<u16>,
        response_time_ms: Option<u64>,
    ) -> Self {
        self.outcome = CheckOutcome::Down;
        self.error = Some(error);
        self.http_status = http_status;
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Override the completion time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_up(&self) -> bool {
        self.outcome == CheckOutcome::Up
    }
}

/// A recorded state machine transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub monitor_id: Uuid,
    pub from: MonitorStatus,
    pub to: MonitorStatus,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_roundtrip() {
        for status in [MonitorStatus::Pending, MonitorStatus::Up, MonitorStatus::Down] {
            assert_eq!(status.to_string().parse::<MonitorStatus>().unwrap(), status);
        }
        assert!("degraded".parse::<MonitorStatus>().is_err());
    }

    #[test]
    fn test_error_kind_from_parts() {
        assert_eq!(ErrorKind::from_parts("timeout", None, None), Some(ErrorKind::Timeout));
        assert_eq!(
            ErrorKind::from_parts("unexpected_status", None, Some(503)),
            Some(ErrorKind::UnexpectedStatus { status: 503 })
        );
        assert_eq!(ErrorKind::from_parts("unexpected_status", None, None), None);
        assert_eq!(
            ErrorKind::from_parts("connection_error", Some("refused".into()), None),
            Some(ErrorKind::ConnectionError { message: "refused".into() })
        );
    }

    #[test]
    fn test_result_from_failed_probe_keeps_status() {
        let result =
            CheckResult::from_probe(Uuid::new_v4(), Utc::now(), ProbeOutcome::unexpected_status(500, 42), 3);

        assert_eq!(result.outcome, CheckOutcome::Down);
        assert_eq!(result.http_status, Some(500));
        assert_eq!(result.error, Some(ErrorKind::UnexpectedStatus { status: 500 }));
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn test_error_kind_serializes_tagged() {
        let json = serde_json::to_value(ErrorKind::UnexpectedStatus { status: 404 }).unwrap();
        assert_eq!(json["kind"], "unexpected_status");
        assert_eq!(json["status"], 404);
    }

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("HEAD".parse::<ProbeMethod>().unwrap(), ProbeMethod::Head);
        assert!("POST".parse::<ProbeMethod>().is_err());
    }
}
