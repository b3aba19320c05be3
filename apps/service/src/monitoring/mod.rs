/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Probing HTTP/HTTPS endpoints
/// - Retrying failed probes within the monitor's interval
/// - Scheduling checks on a bounded worker pool
/// - Folding results into the per-monitor state machine
pub mod checker;
pub mod executor;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod validation;

pub use checker::{Checker, HttpChecker};
pub use executor::MonitoringExecutor;
pub use retry::RetryPolicy;
pub use scheduler::{MonitoringScheduler, ScheduledMonitor, SchedulerHandle, SchedulerOptions};
pub use state::{MonitorState, StateChange};
pub use types::{CheckOutcome, CheckResult, CheckSettings, ErrorKind, MonitorStatus, ProbeMethod};
