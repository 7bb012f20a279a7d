//! Capture error types

use thiserror::Error;

use crate::radio::DriverError;

/// Errors surfaced to callers of the capture controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Sniffer was not running")]
    NotRunning,

    #[error("Invalid channel {0} (expected 0 to hop or 1-13)")]
    InvalidChannel(i64),

    #[error("Radio driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;
