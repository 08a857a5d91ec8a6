//! Errors raised by federation persistence operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use cf_storage::StorageError;

/// Result alias for federation data operations.
pub type Result<T> = std::result::Result<T, FederationDataError>;

/// Errors raised by [`crate::FederationData`].
#[derive(Debug)]
pub enum FederationDataError {
    /// The underlying storage client failed.
    Storage(StorageError),
    /// A blob-data URL could not be parsed into account/container/path.
    MalformedBlobUrl {
        /// The offending URL.
        url: String,
    },
    /// A requested federation, pool, or job entity was not found.
    NotFound {
        /// Human-readable description of what was being looked up.
        what: String,
    },
}

impl Display for FederationDataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(source) => write!(formatter, "storage error: {source}"),
            Self::MalformedBlobUrl { url } => write!(formatter, "malformed blob data url: {url}"),
            Self::NotFound { what } => write!(formatter, "{what} not found"),
        }
    }
}

impl Error for FederationDataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(source) => Some(source),
            _ => None,
        }
    }
}

impl From<StorageError> for FederationDataError {
    fn from(source: StorageError) -> Self {
        match source {
            StorageError::NotFound { what } => Self::NotFound { what },
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_through() {
        let err = FederationDataError::from(StorageError::NotFound {
            what: "sequence entity".into(),
        });
        assert!(matches!(err, FederationDataError::NotFound { .. }));
    }
}
