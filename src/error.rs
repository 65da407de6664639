//! Error types for the reminder call pipeline.

use crate::caller::ProviderError;

/// Top-level error type for the reminder system.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// Configuration load or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Appointment file could not be read or is structurally invalid.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Telephony provider error that survived retry policy.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Batch log or response store I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timestamp formatting error.
    #[error("time format error: {0}")]
    TimeFormat(#[from] time::error::Format),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ReminderError>;
