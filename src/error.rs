//! Centralized error taxonomy for the scheduling engine.
//!
//! Row-level, reference-data-fallback, and scheduling-infeasible conditions
//! are represented as [`crate::domain::Diagnostic`] values returned alongside
//! successful stage output, not as [`Error`] — the pipeline continues past
//! them. `Error` is reserved for conditions that abort a batch upload or a
//! task: structural parse failure, persistence exhaustion, timeout, and
//! cancellation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Workbook could not be decoded at all (corrupt file, unsupported format).
    #[error("workbook unreadable: {0}")]
    WorkbookUnreadable(String),

    /// Header row could not be located within the scanned range.
    #[error("header row not found: {0}")]
    HeaderNotFound(String),

    /// The same workbook (by content digest) was already imported as `batch_id`.
    #[error("duplicate upload of batch {0}")]
    DuplicateUpload(String),

    /// A referenced import batch, task, or work order does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A pipeline invariant was violated in a way that cannot be represented
    /// as a per-row diagnostic (e.g. quantity overflow during merge).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The task referenced is not in a state that allows the requested
    /// transition (e.g. cancelling an already-completed task).
    #[error("invalid task state transition: {0}")]
    InvalidStateTransition(String),

    /// Persistence operation failed after exhausting retries.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Task exceeded its configured timeout.
    #[error("task timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Task was cancelled by the caller.
    #[error("task cancelled")]
    Cancelled,

    /// Application configuration is missing or fails validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<calamine::Error> for Error {
    fn from(err: calamine::Error) -> Self {
        Error::WorkbookUnreadable(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(std::time::Duration::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("batch-123".to_string());
        assert_eq!(err.to_string(), "not found: batch-123");

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "task cancelled");
    }

    #[test]
    fn test_error_traits() {
        let err1 = Error::Cancelled;
        let err2 = err1.clone();
        assert_eq!(err1, err2);

        let err3 = Error::NotFound("id".to_string());
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_err.is_err());
        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(_) => {}
            _ => panic!("expected Serialization error"),
        }

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        match err {
            Error::Io(msg) => assert!(msg.contains("file not found")),
            _ => panic!("expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        fn returns_error() -> Result<i32> {
            Err(Error::Cancelled)
        }

        assert_eq!(returns_result().unwrap(), 42);
        assert!(returns_error().is_err());
    }
}
