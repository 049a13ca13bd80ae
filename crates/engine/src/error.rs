use std::fmt;

use gallery_core::{CoreError, FlagName, ParentId, ResourceId};
use gallery_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Parent(ParentId),
    Resource(ResourceId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent(id) => write!(f, "parent {id}"),
            Self::Resource(id) => write!(f, "resource {id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(Missing),

    #[error("resource {resource_id} belongs to parent {actual}, not {expected}")]
    Mismatch {
        resource_id: ResourceId,
        expected: ParentId,
        actual: ParentId,
    },

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("parent {parent_id} has resources but no {flag} winner")]
    InvariantViolationDetected { parent_id: ParentId, flag: FlagName },

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Only transaction-level failures are worth retrying; everything else
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailed(_))
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TransactionFailed(msg) => Self::TransactionFailed(msg),
            other => Self::Storage(other),
        }
    }
}
