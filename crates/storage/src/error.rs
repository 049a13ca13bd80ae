use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Begin, commit or rollback failed, or a statement hit contention or a
    /// constraint. The unit of work has been rolled back in full.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("resource {resource_id} is not in parent {parent_id}")]
    OutOfScope {
        resource_id: String,
        parent_id: String,
    },

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("core error: {0}")]
    Core(#[from] gallery_core::CoreError),
}

impl StorageError {
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, Self::TransactionFailed(_))
    }
}

/// Busy/locked and constraint failures abort the whole unit of work, so they
/// are reported as transaction failures rather than plain statement errors.
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::ConstraintViolation,
            ) => Self::TransactionFailed(err.to_string()),
            _ => Self::Sqlite(err),
        }
    }
}
