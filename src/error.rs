//! Lifecycle and configuration errors.
//!
//! Logging itself never fails from the caller's point of view; only setting
//! the service up or starting it can.

use thiserror::Error;

/// Logger setup error.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("logger thread already running")]
    AlreadyRunning,

    #[error("failed to spawn logger thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid watermarks: high ({high}) must be greater than low ({low})")]
    InvalidWatermarks { high: usize, low: usize },

    #[error("failed to install log facade: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

/// Result type for logger setup.
pub type Result<T> = std::result::Result<T, LogError>;
