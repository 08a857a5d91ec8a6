//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// An entity update or delete was submitted with a stale etag.
    EtagMismatch {
        /// Logical table name.
        table: String,
        /// Partition key of the entity.
        partition_key: String,
        /// Row key of the entity.
        row_key: String,
    },
    /// An entity insert targeted a partition/row key pair that already exists.
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
    /// A lease operation was attempted against a blob already leased by someone else.
    LeaseConflict {
        /// Storage container.
        container: String,
        /// Blob name within the container.
        blob_name: String,
    },
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::EtagMismatch {
                table,
                partition_key,
                row_key,
            } => write!(
                formatter,
                "etag mismatch updating {table}/{partition_key}/{row_key}"
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
            Self::LeaseConflict {
                container,
                blob_name,
            } => write!(formatter, "lease conflict on {container}/{blob_name}"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::EtagMismatch { .. }
            | Self::AlreadyExists { .. }
            | Self::NotFound { .. }
            | Self::LeaseConflict { .. } => None,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(source: sqlx::Error) -> Self {
        Self::QueryFailed {
            operation: "sqlx operation",
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_display_and_source() {
        let migration = DataError::MigrationFailed {
            source: sqlx::migrate::MigrateError::VersionMissing(1),
        };
        assert_eq!(migration.to_string(), "migration failed");
        assert!(migration.source().is_some());

        let query = DataError::QueryFailed {
            operation: "fetch",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(query.to_string(), "database operation failed");
        assert!(query.source().is_some());

        let etag = DataError::EtagMismatch {
            table: "fedpools".into(),
            partition_key: "fed-1".into(),
            row_key: "pool-1".into(),
        };
        assert_eq!(
            etag.to_string(),
            "etag mismatch updating fedpools/fed-1/pool-1"
        );
        assert!(etag.source().is_none());

        let from = DataError::from(sqlx::Error::RowNotFound);
        assert_eq!(from.to_string(), "database operation failed");
        assert!(from.source().is_some());
    }
}
