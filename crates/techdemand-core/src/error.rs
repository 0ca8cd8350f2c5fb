use std::time::Duration;

use thiserror::Error;

use crate::task::FailureKind;

/// Application-wide error types for techdemand.
#[derive(Error, Debug)]
pub enum AppError {
    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// HTTP request could not be built (bad URL, bad header, redirect loop).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error (refused, reset, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response arrived but its body could not be read.
    #[error("Failed to read response body: {0}")]
    BodyReadError(String),

    /// The extracted count literal is not an integer.
    #[error("Vacancy count is not a number: {0:?}")]
    NotANumber(String),

    /// The aggregator asked for a (technology, city) pair that has no task.
    #[error("No task for technology '{technology}' in city {city_code}")]
    MissingTask { technology: String, city_code: u32 },

    /// One or more tasks ended in a fetch failure and partial runs are not allowed.
    #[error(
        "{failed} task(s) failed; first: {kind} for '{technology}' in city {city_code}: {message}"
    )]
    FetchFailed {
        failed: usize,
        kind: FailureKind,
        technology: String,
        city_code: u32,
        message: String,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The run was cancelled before every task finished.
    #[error("Run cancelled")]
    Cancelled,

    /// A spawned fetch task panicked or was aborted.
    #[error("Fetch task aborted: {0}")]
    TaskAborted(String),

    /// Writing a report file failed.
    #[error("Output error: {0}")]
    OutputError(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::BodyReadError(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classify a fetch error into the failure kind recorded on a task.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::NetworkError(_) => FailureKind::Connectivity,
            AppError::Timeout(_) => FailureKind::Timeout,
            AppError::BodyReadError(_) => FailureKind::BodyRead,
            AppError::HttpStatus { .. } => FailureKind::HttpStatus,
            _ => FailureKind::Request,
        }
    }
}
