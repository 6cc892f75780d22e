//! Custom error types for the application.
//!
//! This module defines the primary error type, `SwingError`, for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures that can occur, from configuration and I/O issues
//! to invalid recording-state transitions.
//!
//! ## Error Hierarchy
//!
//! `SwingError` consolidates several categories:
//!
//! - **`Config`** / **`Configuration`**: parse failures from `figment` and semantic
//!   validation failures of an otherwise well-formed configuration.
//! - **`Io`**, **`Serialization`**, **`Csv`**, **`Storage`**: persistence and transport
//!   level problems.
//! - **`MalformedPayload`**: a whole transport message could not be understood. Single
//!   malformed samples inside an otherwise valid message are skipped, not reported.
//! - **`AlreadyRecording`**, **`NotRecording`**, **`RecordingNotClosed`**,
//!   **`EmptyRecording`**: invalid-state conditions of the capture lifecycle. These are
//!   always reported to the caller and never silently absorbed.
//! - **`JobNotFound`**: a poll for an analysis job that does not exist or whose result
//!   has already been consumed.
//!
//! "Insufficient data" is deliberately *not* an error: the analyzer reports it through
//! the metrics themselves.

use crate::jobs::JobId;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SwingError>;

/// Primary error type for the swing acquisition pipeline.
#[derive(Error, Debug)]
pub enum SwingError {
    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration was parsed but contains invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or network I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A transport message could not be interpreted as a batch of samples.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// `start` was requested while a recording is already open.
    #[error("A recording is already in progress")]
    AlreadyRecording,

    /// `stop` was requested while no recording is open.
    #[error("No recording is in progress")]
    NotRecording,

    /// A recording without an end time was handed to analysis.
    #[error("Recording has not been closed")]
    RecordingNotClosed,

    /// A recording without any captured frames was handed to analysis.
    #[error("Recording contains no samples")]
    EmptyRecording,

    /// The analysis job is unknown or its result was already retrieved.
    #[error("Analysis job {0} not found")]
    JobNotFound(JobId),

    /// A recording sink failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SwingError {
    /// Returns true for errors caused by calling a lifecycle operation in the wrong state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            SwingError::AlreadyRecording
                | SwingError::NotRecording
                | SwingError::RecordingNotClosed
                | SwingError::EmptyRecording
        )
    }
}
