//! Error types for TableKV
//!
//! Provides a unified error type for all operations. Expected conditions
//! (missing entity, key conflict, stale ETag) are ordinary variants so that
//! callers can report them and carry on.

use thiserror::Error;

/// Result type alias using TableError
pub type Result<T> = std::result::Result<T, TableError>;

/// Unified error type for TableKV operations
#[derive(Debug, Error)]
pub enum TableError {
    // -------------------------------------------------------------------------
    // Entity Errors
    // -------------------------------------------------------------------------
    #[error("Entity not found: ({partition_key}, {row_key})")]
    NotFound {
        partition_key: String,
        row_key: String,
    },

    #[error("Entity already exists: ({partition_key}, {row_key})")]
    Conflict {
        partition_key: String,
        row_key: String,
    },

    #[error("ETag mismatch: expected {expected}, stored {actual}")]
    Concurrency { expected: String, actual: String },

    #[error("Validation error: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Batch Errors
    // -------------------------------------------------------------------------
    #[error("Batch spans more than one partition: expected '{expected}', found '{found}'")]
    BatchPartitionMismatch { expected: String, found: String },

    #[error("Batch operation {index} failed: {source}")]
    BatchOperationFailed {
        index: usize,
        #[source]
        source: Box<TableError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Table Errors
    // -------------------------------------------------------------------------
    #[error("Table not found: {0}")]
    TableNotFound(String),

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot corruption detected: {0}")]
    SnapshotCorruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TableError {
    pub(crate) fn not_found(partition_key: &str, row_key: &str) -> Self {
        TableError::NotFound {
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
        }
    }

    pub(crate) fn conflict(partition_key: &str, row_key: &str) -> Self {
        TableError::Conflict {
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
        }
    }

    /// Strip a batch wrapper and return the per-operation cause
    pub fn root_cause(&self) -> &TableError {
        match self {
            TableError::BatchOperationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for a missing entity, whether reported directly or from a batch
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), TableError::NotFound { .. })
    }

    /// True for an insert on an existing key
    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), TableError::Conflict { .. })
    }

    /// True for an ETag mismatch
    pub fn is_concurrency(&self) -> bool {
        matches!(self.root_cause(), TableError::Concurrency { .. })
    }
}

impl From<bincode::Error> for TableError {
    fn from(err: bincode::Error) -> Self {
        TableError::Serialization(err.to_string())
    }
}
