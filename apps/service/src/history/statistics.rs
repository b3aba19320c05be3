use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::monitoring::types::{CheckResult, ParseEnumError};

/// Time window a history query covers, ending now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Hour, Window::Day, Window::Week, Window::Month];

    pub fn duration(&self) -> TimeDelta {
        match self {
            Window::Hour => TimeDelta::hours(1),
            Window::Day => TimeDelta::hours(24),
            Window::Week => TimeDelta::days(7),
            Window::Month => TimeDelta::days(30),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Hour => write!(f, "1h"),
            Window::Day => write!(f, "24h"),
            Window::Week => write!(f, "7d"),
            Window::Month => write!(f, "30d"),
        }
    }
}

impl FromStr for Window {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Window::Hour),
            "24h" | "1d" => Ok(Window::Day),
            "7d" => Ok(Window::Week),
            "30d" => Ok(Window::Month),
            other => Err(ParseEnumError::new("history window", other)),
        }
    }
}

/// Aggregates over the checks of one window.
///
/// Latency figures only consider successful checks; failed checks still
/// count towards `total_checks`. With no checks at all, uptime is unknown
/// (`None`) rather than 0 or 100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub average_ms: Option<f64>,
    pub minimum_ms: Option<u64>,
    pub maximum_ms: Option<u64>,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub uptime_percentage: Option<f64>,
}

impl Statistics {
    pub fn compute<'a>(results: impl IntoIterator<Item = &'a CheckResult>) -> Self {
        let mut stats = Statistics::default();
        let mut latency_sum: u64 = 0;
        let mut latency_count: u64 = 0;

        for result in results {
            stats.total_checks += 1;
            if !result.is_up() {
                stats.failed_checks += 1;
                continue;
            }

            stats.successful_checks += 1;
            if let Some(ms) = result.response_time_ms {
                latency_sum += ms;
                latency_count += 1;
                stats.minimum_ms = Some(stats.minimum_ms.map_or(ms, |min| min.min(ms)));
                stats.maximum_ms = Some(stats.maximum_ms.map_or(ms, |max| max.max(ms)));
            }
        }

        if latency_count > 0 {
            stats.average_ms = Some(latency_sum as f64 / latency_count as f64);
        }
        if stats.total_checks > 0 {
            stats.uptime_percentage =
                Some(stats.successful_checks as f64 / stats.total_checks as f64 * 100.0);
        }

        stats
    }
}
