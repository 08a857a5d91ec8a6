//! Error types for the storage client.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use cf_data::DataError;

/// Result alias for storage client operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by [`crate::StorageClient`].
#[derive(Debug)]
pub enum StorageError {
    /// A transient transport/database error survived the retry budget.
    Transient {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Underlying error.
        source: DataError,
    },
    /// An `update`/`delete` with if-match semantics found a different etag.
    Conflict {
        /// Logical table name.
        table: String,
        /// Partition key of the entity.
        partition_key: String,
        /// Row key of the entity.
        row_key: String,
    },
    /// An `insert` targeted a partition/row key pair that already exists.
    AlreadyExists {
        /// Logical table name.
        table: String,
        /// Partition key of the entity.
        partition_key: String,
        /// Row key of the entity.
        row_key: String,
    },
    /// The requested entity, blob, or queue message was not found.
    NotFound {
        /// Human-readable description of what was being looked up.
        what: String,
    },
    /// A lease operation contended with an existing, unexpired lease.
    LeaseUnavailable {
        /// Storage container.
        container: String,
        /// Blob name within the container.
        blob_name: String,
    },
    /// The S3-compatible blob backend returned an error.
    Blob {
        /// Operation being attempted.
        operation: &'static str,
        /// Underlying error message.
        message: String,
    },
}

impl Display for StorageError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { attempts, .. } => {
                write!(formatter, "storage operation failed after {attempts} attempts")
            }
            Self::Conflict {
                table,
                partition_key,
                row_key,
            } => write!(
                formatter,
                "etag conflict updating {table}/{partition_key}/{row_key}"
            ),
            Self::AlreadyExists {
                table,
                partition_key,
                row_key,
            } => write!(
                formatter,
                "entity already exists at {table}/{partition_key}/{row_key}"
            ),
            Self::NotFound { what } => write!(formatter, "{what} not found"),
            Self::LeaseUnavailable {
                container,
                blob_name,
            } => write!(formatter, "lease unavailable on {container}/{blob_name}"),
            Self::Blob { operation, message } => {
                write!(formatter, "blob {operation} failed: {message}")
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transient { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DataError> for StorageError {
    fn from(source: DataError) -> Self {
        match source {
            DataError::EtagMismatch {
                table,
                partition_key,
                row_key,
            } => Self::Conflict {
                table,
                partition_key,
                row_key,
            },
            DataError::AlreadyExists {
                table,
                partition_key,
                row_key,
            } => Self::AlreadyExists {
                table,
                partition_key,
                row_key,
            },
            DataError::NotFound { what } => Self::NotFound { what },
            other => Self::Transient {
                attempts: 0,
                source: other,
            },
        }
    }
}

/// True when `error` represents a transport-level failure worth retrying
/// (connection loss, pool exhaustion) rather than a semantic result the
/// caller must handle (conflict, not-found, already-exists).
#[must_use]
pub fn is_transient(error: &DataError) -> bool {
    matches!(
        error,
        DataError::QueryFailed {
            source:
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_),
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_mismatch_maps_to_conflict() {
        let err = StorageError::from(DataError::EtagMismatch {
            table: "fedjobs".into(),
            partition_key: "fedhash$jobid".into(),
            row_key: "rowkey".into(),
        });
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn io_error_is_transient() {
        let io = std::io::Error::other("reset");
        let err = DataError::QueryFailed {
            operation: "get",
            source: sqlx::Error::Io(io),
        };
        assert!(is_transient(&err));
    }

    #[test]
    fn row_not_found_is_not_transient() {
        let err = DataError::QueryFailed {
            operation: "get",
            source: sqlx::Error::RowNotFound,
        };
        assert!(!is_transient(&err));
    }
}
