//! Error types for `TableStore`.
//!
//! Every engine failure surfaces through [`Error`]. Each variant carries the
//! offending name, index or version so hosting services can build an
//! actionable message, and [`Error::category`] tells them how to map it to a
//! client-visible status.

use std::path::PathBuf;

use thiserror::Error;

use crate::condition::ConditionError;

/// Result type alias for `TableStore` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller violated a precondition. Never retried automatically.
    Usage,
    /// The file or its directory is missing or not accessible.
    Resource,
    /// The file is held by another handle or process.
    Contention,
    /// The file is not a table file, or its version is too old for the call.
    Format,
    /// The caller lacks write capability on the file.
    Authorization,
    /// Engine bug or unexpected serialization failure.
    Internal,
}

/// Errors that can occur in `TableStore` operations.
///
/// Error codes follow the pattern `TBL-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Column definition is invalid (TBL-001).
    #[error("[TBL-001] Invalid column: {0}")]
    InvalidColumn(String),

    /// Column name uses the reserved `__` prefix (TBL-002).
    #[error("[TBL-002] Reserved column name: {0}")]
    ReservedName(String),

    /// `initialize` called on a table that already has a schema (TBL-003).
    #[error("[TBL-003] Table already initialized: {0}")]
    AlreadyInitialized(PathBuf),

    /// Operation requires an initialized table (TBL-004).
    #[error("[TBL-004] Table not yet initialized: {0}")]
    NotInitialized(PathBuf),

    /// Row index outside the table (TBL-005).
    #[error("[TBL-005] Row index {row} out of range (table has {rows} rows)")]
    RowOutOfRange {
        /// Requested row.
        row: u64,
        /// Number of rows in the table.
        rows: u64,
    },

    /// Supplied columns do not match the schema (TBL-006).
    #[error("[TBL-006] Column mismatch: {0}")]
    ColumnMismatch(String),

    /// Values supplied for a column are of the wrong shape or size (TBL-007).
    #[error("[TBL-007] Invalid values for column '{column}': {message}")]
    ValueMismatch {
        /// Column name.
        column: String,
        /// What was wrong.
        message: String,
    },

    /// Metadata value type is not one of string, long or double (TBL-008).
    #[error("[TBL-008] Unsupported metadata type for '{key}': {type_name}")]
    UnsupportedMetadataType {
        /// Metadata key.
        key: String,
        /// Name of the rejected type.
        type_name: String,
    },

    /// Metadata key uses the reserved `__` prefix (TBL-009).
    #[error("[TBL-009] Reserved attribute name: {0}")]
    ReservedMetadataKey(String),

    /// Row-selection condition failed to parse, type-check or evaluate (TBL-010).
    #[error("[TBL-010] Invalid condition: {0}")]
    Condition(#[from] ConditionError),

    /// Table handle or storage has been closed (TBL-011).
    #[error("[TBL-011] Table is closed: {0}")]
    Closed(PathBuf),

    /// Handle is older than the last modification of the table (TBL-012).
    #[error("[TBL-012] Resource modified since last stamp (handle {handle}, table {table})")]
    OptimisticLock {
        /// Stamp held by the handle.
        handle: u64,
        /// Current stamp of the table.
        table: u64,
    },

    /// A configured limit was exceeded (TBL-013).
    #[error("[TBL-013] Limit '{limit}' exceeded: {value} > {max}")]
    LimitExceeded {
        /// Configuration key of the limit.
        limit: &'static str,
        /// Requested value.
        value: u64,
        /// Configured maximum.
        max: u64,
    },

    /// IO error (TBL-014).
    #[error("[TBL-014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File or directory does not exist (TBL-015).
    #[error("[TBL-015] Not found: {0}")]
    NotFound(PathBuf),

    /// File is locked by another handle or process (TBL-016).
    #[error("[TBL-016] Lock timeout: {0} is already in use")]
    Locked(PathBuf),

    /// File exists but is not a valid table file (TBL-017).
    #[error("[TBL-017] Invalid table file {path}: {reason}")]
    InvalidFormat {
        /// Path of the file.
        path: PathBuf,
        /// What failed validation.
        reason: String,
    },

    /// Operation needs a newer on-disk version (TBL-018).
    #[error("[TBL-018] {operation} is only supported for version >= {required} (file is version {actual})")]
    VersionUnsupported {
        /// Operation that was refused.
        operation: &'static str,
        /// Minimum version needed.
        required: u32,
        /// Version of the file.
        actual: u32,
    },

    /// Caller may not write to this file (TBL-019).
    #[error("[TBL-019] Security violation: {0}")]
    SecurityViolation(String),

    /// Serialization error (TBL-020).
    #[error("[TBL-020] Serialization error: {0}")]
    Serialization(String),

    /// Internal error (TBL-021).
    ///
    /// Indicates a broken engine invariant. Please report if encountered.
    #[error("[TBL-021] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "TBL-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidColumn(_) => "TBL-001",
            Self::ReservedName(_) => "TBL-002",
            Self::AlreadyInitialized(_) => "TBL-003",
            Self::NotInitialized(_) => "TBL-004",
            Self::RowOutOfRange { .. } => "TBL-005",
            Self::ColumnMismatch(_) => "TBL-006",
            Self::ValueMismatch { .. } => "TBL-007",
            Self::UnsupportedMetadataType { .. } => "TBL-008",
            Self::ReservedMetadataKey(_) => "TBL-009",
            Self::Condition(_) => "TBL-010",
            Self::Closed(_) => "TBL-011",
            Self::OptimisticLock { .. } => "TBL-012",
            Self::LimitExceeded { .. } => "TBL-013",
            Self::Io(_) => "TBL-014",
            Self::NotFound(_) => "TBL-015",
            Self::Locked(_) => "TBL-016",
            Self::InvalidFormat { .. } => "TBL-017",
            Self::VersionUnsupported { .. } => "TBL-018",
            Self::SecurityViolation(_) => "TBL-019",
            Self::Serialization(_) => "TBL-020",
            Self::Internal(_) => "TBL-021",
        }
    }

    /// Returns the category used by hosting layers to pick a client status.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidColumn(_)
            | Self::ReservedName(_)
            | Self::AlreadyInitialized(_)
            | Self::NotInitialized(_)
            | Self::RowOutOfRange { .. }
            | Self::ColumnMismatch(_)
            | Self::ValueMismatch { .. }
            | Self::UnsupportedMetadataType { .. }
            | Self::ReservedMetadataKey(_)
            | Self::Condition(_)
            | Self::Closed(_)
            | Self::OptimisticLock { .. }
            | Self::LimitExceeded { .. } => ErrorCategory::Usage,
            Self::Io(_) | Self::NotFound(_) => ErrorCategory::Resource,
            Self::Locked(_) => ErrorCategory::Contention,
            Self::InvalidFormat { .. } | Self::VersionUnsupported { .. } => ErrorCategory::Format,
            Self::SecurityViolation(_) => ErrorCategory::Authorization,
            Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if the caller may retry the same call later.
    ///
    /// Only lock contention and stale handles qualify; the engine itself
    /// never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked(_) | Self::OptimisticLock { .. })
    }

    pub(crate) fn value_mismatch(column: &str, message: impl Into<String>) -> Self {
        Self::ValueMismatch {
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
