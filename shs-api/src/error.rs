/// Error types for the Statistical API library
use shs_utils::error::TimeError;
use thiserror::Error;

/// Main error type for Statistical API operations
#[derive(Error, Debug)]
pub enum StatisticalError {
    /// Caller supplied a value the payload cannot be built from
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Time interval could not be normalized
    #[error("Invalid time interval: {0}")]
    Time(#[from] TimeError),

    /// Bounding box or geometry could not be resolved into request bounds
    #[error("Invalid request bounds: {0}")]
    Bounds(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing cached responses failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed
    #[cfg(feature = "api")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("Service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Access token could not be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Every download attempt failed
    #[error("Download failed after {attempts} attempts: {reason}")]
    DownloadFailed { attempts: u32, reason: String },
}

/// Type alias for Results using StatisticalError
pub type Result<T> = std::result::Result<T, StatisticalError>;
