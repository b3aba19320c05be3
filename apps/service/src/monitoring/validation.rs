//! Input validation for monitor definitions.
//!
//! Everything here runs synchronously at creation/edit time so that an
//! invalid monitor never reaches the scheduler.

use url::Url;

use crate::error::MonitorError;

pub const MIN_INTERVAL: u64 = 1;
pub const MAX_INTERVAL: u64 = 86_400; // 24 hours
pub const MAX_TIMEOUT: u64 = 300; // 5 minutes
pub const MAX_RETRIES: u32 = 10;
pub const MAX_FAILURE_THRESHOLD: u32 = 100;
pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Validate that the target is an absolute http(s) URL with a host
pub fn validate_url(target: &str) -> Result<(), MonitorError> {
    if target.trim().is_empty() {
        return Err(MonitorError::invalid("URL cannot be empty"));
    }

    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(e) => {
            return Err(if !target.contains("://") {
                MonitorError::invalid("URL must include scheme (http:// or https://)")
            } else {
                MonitorError::invalid(format!("Invalid URL: {e}"))
            });
        }
    };

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MonitorError::invalid(format!(
                "Invalid scheme '{other}'. Must be http or https"
            )));
        }
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(MonitorError::invalid("URL must have a valid host")),
    }

    if url.port() == Some(0) {
        return Err(MonitorError::invalid("Port 0 is not valid"));
    }

    Ok(())
}

/// Validate check interval bounds
pub fn validate_check_interval(interval_seconds: u64) -> Result<(), MonitorError> {
    if interval_seconds < MIN_INTERVAL {
        return Err(MonitorError::invalid(format!(
            "Check interval too short: {interval_seconds} seconds (minimum: {MIN_INTERVAL})"
        )));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(MonitorError::invalid(format!(
            "Check interval too long: {interval_seconds} seconds (maximum: {MAX_INTERVAL})"
        )));
    }

    Ok(())
}

/// Validate the per-attempt timeout, which must stay below the interval
pub fn validate_timeout(timeout_seconds: u64, interval_seconds: u64) -> Result<(), MonitorError> {
    if timeout_seconds == 0 {
        return Err(MonitorError::invalid("Timeout must be at least 1 second"));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(MonitorError::invalid(format!(
            "Timeout too long: {timeout_seconds} seconds (maximum: {MAX_TIMEOUT})"
        )));
    }

    if timeout_seconds >= interval_seconds {
        return Err(MonitorError::invalid(format!(
            "Timeout ({timeout_seconds}s) must be shorter than the check interval ({interval_seconds}s)"
        )));
    }

    Ok(())
}

pub fn validate_max_retries(max_retries: u32) -> Result<(), MonitorError> {
    if max_retries > MAX_RETRIES {
        return Err(MonitorError::invalid(format!(
            "Too many retries: {max_retries} (maximum: {MAX_RETRIES})"
        )));
    }
    Ok(())
}

pub fn validate_expected_status(status: u16) -> Result<(), MonitorError> {
    if !(100..=599).contains(&status) {
        return Err(MonitorError::invalid(format!("Expected status {status} is not an HTTP status code")));
    }
    Ok(())
}

pub fn validate_failure_threshold(threshold: u32) -> Result<(), MonitorError> {
    if threshold == 0 || threshold > MAX_FAILURE_THRESHOLD {
        return Err(MonitorError::invalid(format!(
            "Failure threshold must be between 1 and {MAX_FAILURE_THRESHOLD}, got {threshold}"
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), MonitorError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MonitorError::invalid("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(MonitorError::invalid(format!(
            "Name too long (maximum: {MAX_NAME_LENGTH} characters)"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), MonitorError> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(MonitorError::invalid(format!(
            "Description too long (maximum: {MAX_DESCRIPTION_LENGTH} characters)"
        )));
    }
    Ok(())
}

/// Display name for a monitor created without one: the URL host, plus the
/// path when it is more than `/`.
pub fn derive_name(target: &str) -> String {
    match Url::parse(target) {
        Ok(url) => {
            let host = url.host_str().unwrap_or(target);
            match url.path() {
                "" | "/" => host.to_string(),
                path => format!("{host}{}", path.trim_end_matches('/')),
            }
        }
        Err(_) => target.to_string(),
    }
}
