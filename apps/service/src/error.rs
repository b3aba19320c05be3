use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the monitor management operations.
///
/// Probe failures never show up here: they are recorded as `down` check
/// results instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Monitor {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl MonitorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
