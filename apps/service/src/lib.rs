//! Pulse uptime monitoring engine.
//!
//! The engine periodically probes HTTP endpoints, keeps a per-monitor
//! pending/up/down state machine, records every definitive check in an
//! append-only history and raises down/recovery alerts on transitions.
//!
//! [`Orchestrator`] is the entry point: it owns the scheduler, the result
//! processing loop and the alert dispatcher, and exposes the management
//! operations (create, edit, pause, resume, delete, history).

pub mod alerts;
pub mod config;
pub mod database;
pub mod error;
pub mod history;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;

pub use config::Config;
pub use error::MonitorError;
pub use orchestrator::Orchestrator;
