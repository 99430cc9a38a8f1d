use serde::Serialize;
use thiserror::Error;

use crate::{config::ConfigError, engine::EngineError};

/// Errors raised by the retention components.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The catalog is not in the shape an operation requires. Raised before any
    /// mutation of the affected object.
    #[error("Structural precondition failed: {0}")]
    StructuralPrecondition(String),

    #[error("Engine operation failed: {0}")]
    Engine(#[source] EngineError),

    #[error("Purge of {year} left {} table(s) unpurged: {}", failed.len(), failed.join(", "))]
    PartialPurge { year: i32, failed: Vec<String> },
}

impl RetentionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetentionError::Configuration(_) => ErrorKind::Configuration,
            RetentionError::StructuralPrecondition(_) => ErrorKind::StructuralPrecondition,
            RetentionError::Engine(_) => ErrorKind::Engine,
            RetentionError::PartialPurge { .. } => ErrorKind::PartialPurge,
        }
    }
}

/// Engine rejections caused by catalog shape (a non-empty switch target, a
/// dependent object) surface as structural preconditions.
impl From<EngineError> for RetentionError {
    fn from(err: EngineError) -> Self {
        if err.is_structural() {
            RetentionError::StructuralPrecondition(err.to_string())
        } else {
            RetentionError::Engine(err)
        }
    }
}

pub type RetentionResult<T> = Result<T, RetentionError>;

/// Serializable classification of a [`RetentionError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    StructuralPrecondition,
    Engine,
    PartialPurge,
}

/// A failure recorded in a report instead of being raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RetentionError> for RecordedFailure {
    fn from(err: &RetentionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A per-table failure recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub failure: RecordedFailure,
}

impl TableFailure {
    pub fn new(table: impl Into<String>, err: &RetentionError) -> Self {
        Self {
            table: table.into(),
            failure: err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_rejection_is_structural() {
        let err: RetentionError = EngineError::SwitchRejected("occupied".into()).into();
        assert_eq!(err.kind(), ErrorKind::StructuralPrecondition);
    }

    #[test]
    fn test_timeout_stays_engine_failure() {
        let err: RetentionError = EngineError::Timeout("[dbo].[t]".into()).into();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_partial_purge_message_lists_tables() {
        let err = RetentionError::PartialPurge {
            year: 2022,
            failed: vec!["main_a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "Purge of 2022 left 2 table(s) unpurged: main_a, b"
        );
    }
}
