use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Dependency conflict: {0}")]
    DependencyConflict(String),

    #[error("Partition switch rejected: {0}")]
    SwitchRejected(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock request timed out on {0}")]
    Timeout(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Errors the engine raises because the catalog is in the wrong shape for the
    /// requested operation, as opposed to the statement failing to run.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::SwitchRejected(_) | EngineError::DependencyConflict(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
