use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::retry::BackoffStrategy;
use crate::monitoring::types::ProbeMethod;
use crate::monitoring::validation;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub retry: RetryConfig,
    pub alerts: AlertsConfig,
    pub retention: RetentionConfig,
    /// Values applied to new monitors that leave a setting out
    pub defaults: MonitorDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the libsql database file, or `:memory:` for a volatile store
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of checks probing at the same time
    pub workers: usize,
    /// Upper bound of the random delay before a newly scheduled monitor is first checked
    pub startup_jitter_ms: u64,
    /// How often the monitor set is re-read from the database, 0 disables
    pub reload_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub user_agent: String,
    pub follow_redirects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub strategy: BackoffStrategy,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// JSON webhook receiving every alert
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    /// Re-send "still down" alerts this often during an outage, unset disables
    pub renotify_interval_secs: Option<u64>,
    /// Delivery attempts per sink before an alert is given up on
    pub dispatch_attempts: u32,
    pub dispatch_retry_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub result_days: i64,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorDefaults {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub expected_status_code: u16,
    pub failure_threshold: u32,
    pub method: ProbeMethod,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pulse.db".into(), max_connections: 8 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { workers: 32, startup_jitter_ms: 2_000, reload_interval_secs: 30 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("pulse/", env!("CARGO_PKG_VERSION")).into(),
            follow_redirects: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { strategy: BackoffStrategy::Fixed, backoff_ms: 1_000, max_backoff_ms: 8_000 }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: 10,
            renotify_interval_secs: None,
            dispatch_attempts: 3,
            dispatch_retry_ms: 2_000,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { result_days: 30, cleanup_interval_secs: 3600 }
    }
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            timeout_seconds: 30,
            max_retries: 3,
            expected_status_code: 200,
            failure_threshold: 1,
            method: ProbeMethod::Get,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pulse/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_title = |f: &mut fmt::Formatter<'_>, label: &str| writeln!(f, "  {label}");
        let write_value = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "    {label}: {value}")
        };
        let optional = |value: Option<String>| value.unwrap_or_else(|| "disabled".to_string());

        writeln!(f, "Current Internal Configuration State:")?;
        write_title(f, "Database")?;
        write_value(f, "Path", &self.database.path)?;
        write_value(f, "Max Connections", &self.database.max_connections)?;

        write_title(f, "Scheduler")?;
        write_value(f, "Workers", &self.scheduler.workers)?;
        write_value(f, "Startup Jitter (ms)", &self.scheduler.startup_jitter_ms)?;
        write_value(f, "Reload Interval (s)", &self.scheduler.reload_interval_secs)?;

        write_title(f, "Probe")?;
        write_value(f, "User Agent", &self.probe.user_agent)?;
        write_value(f, "Follow Redirects", &self.probe.follow_redirects)?;

        write_title(f, "Retry")?;
        write_value(f, "Strategy", &self.retry.strategy)?;
        write_value(f, "Backoff (ms)", &self.retry.backoff_ms)?;
        write_value(f, "Max Backoff (ms)", &self.retry.max_backoff_ms)?;

        write_title(f, "Alerts")?;
        write_value(f, "Webhook", &optional(self.alerts.webhook_url.clone()))?;
        write_value(
            f,
            "Re-notify Interval (s)",
            &optional(self.alerts.renotify_interval_secs.map(|secs| secs.to_string())),
        )?;
        write_value(f, "Dispatch Attempts", &self.alerts.dispatch_attempts)?;

        write_title(f, "Retention")?;
        write_value(f, "Result Days", &self.retention.result_days)?;
        write_value(f, "Cleanup Interval (s)", &self.retention.cleanup_interval_secs)?;

        write_title(f, "Monitor Defaults")?;
        write_value(f, "Interval (s)", &self.defaults.interval_seconds)?;
        write_value(f, "Timeout (s)", &self.defaults.timeout_seconds)?;
        write_value(f, "Max Retries", &self.defaults.max_retries)?;
        write_value(f, "Expected Status", &self.defaults.expected_status_code)?;
        write_value(f, "Failure Threshold", &self.defaults.failure_threshold)?;
        write_value(f, "Method", &self.defaults.method)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulse/config.toml
    /// or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// let cfg = pulse::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), pulse::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.scheduler.workers == 0 {
            return Err(Error::Invalid("scheduler.workers must be at least 1".into()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.alerts.dispatch_attempts == 0 {
            return Err(Error::Invalid("alerts.dispatch_attempts must be at least 1".into()));
        }
        if self.retention.result_days <= 0 {
            return Err(Error::Invalid("retention.result_days must be positive".into()));
        }
        if let Some(url) = &self.alerts.webhook_url {
            validation::validate_url(url).map_err(|e| Error::Invalid(format!("alerts.webhook_url: {e}")))?;
        }

        let defaults = &self.defaults;
        validation::validate_check_interval(defaults.interval_seconds)
            .and_then(|()| validation::validate_timeout(defaults.timeout_seconds, defaults.interval_seconds))
            .and_then(|()| validation::validate_max_retries(defaults.max_retries))
            .and_then(|()| validation::validate_expected_status(defaults.expected_status_code))
            .and_then(|()| validation::validate_failure_threshold(defaults.failure_threshold))
            .map_err(|e| Error::Invalid(format!("defaults: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pulse/config.toml");

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.defaults.interval_seconds, 60);
        assert_eq!(config.defaults.timeout_seconds, 30);
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.expected_status_code, 200);
        assert_eq!(config.defaults.failure_threshold, 1);
        assert!(config.alerts.renotify_interval_secs.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\nworkers = 4\n\n[alerts]\nrenotify_interval_secs = 600\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.scheduler.workers, 4);
        assert_eq!(config.scheduler.reload_interval_secs, 30);
        assert_eq!(config.alerts.renotify_interval_secs, Some(600));
        assert_eq!(config.database.path, "pulse.db");
    }

    #[test]
    fn test_extension_is_normalized() {
        assert_eq!(
            normalize_toml_path(path::Path::new("/tmp/pulse")),
            path::PathBuf::from("/tmp/pulse.toml")
        );
    }

    #[test]
    fn test_invalid_defaults_are_rejected() {
        let mut config = Config::default();
        config.defaults.timeout_seconds = config.defaults.interval_seconds;
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config = Config::default();
        config.scheduler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Scheduler"));
        assert!(rendered.contains("Webhook: disabled"));
    }
}
