//! Error types for check-in operations.

use latchkey_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for check-in operations.
pub type CheckInResult<T> = Result<T, CheckInError>;

/// The operation boundary an error was caught at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Edit,
    Delete,
    Count,
    Properties,
    Sweep,
    Access,
    CallLog,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Count => "count",
            Self::Properties => "properties",
            Self::Sweep => "sweep",
            Self::Access => "access",
            Self::CallLog => "call log",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in check-in operations.
#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("{operation} failed reading {target}: {source}")]
    StoreRead {
        operation: Operation,
        target: String,
        #[source]
        source: StorageError,
    },

    #[error("{operation} failed writing {target}: {source}")]
    StoreWrite {
        operation: Operation,
        target: String,
        #[source]
        source: StorageError,
    },

    #[error("invalid paging state: {0}")]
    InvalidPagingState(String),

    #[error("invalid filters: {0}")]
    InvalidFilters(String),

    #[error("invalid check-in: {0}")]
    InvalidRecord(String),

    #[error("property not found: {0}")]
    PropertyNotFound(String),

    #[error("could not decode {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("invalid caller number: {0:?}")]
    InvalidCaller(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckInError {
    pub(crate) fn read(operation: Operation, target: impl Into<String>, source: StorageError) -> Self {
        Self::StoreRead {
            operation,
            target: target.into(),
            source,
        }
    }

    pub(crate) fn write(operation: Operation, target: impl Into<String>, source: StorageError) -> Self {
        Self::StoreWrite {
            operation,
            target: target.into(),
            source,
        }
    }

    pub(crate) fn decode(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for failures reported by the store adapter.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::StoreRead { .. } | Self::StoreWrite { .. })
    }
}
