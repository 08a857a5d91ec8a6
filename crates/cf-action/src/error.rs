//! Errors raised while processing a federation's action queue.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use cf_batch::BatchError;
use cf_federation::FederationError;
use cf_federation_data::FederationDataError;
use cf_storage::StorageError;

/// Result alias for action-processing operations.
pub type Result<T> = std::result::Result<T, ActionError>;

/// Errors raised by [`crate::ActionProcessor`].
#[derive(Debug)]
pub enum ActionError {
    /// Federation/pool persistence failed.
    Data(FederationDataError),
    /// The batch service rejected a request.
    Batch(BatchError),
    /// No candidate pool could be matched; the action remains queued.
    Unmatched(FederationError),
    /// A payload blob failed to deserialize.
    Malformed {
        /// What failed to parse.
        what: String,
    },
}

impl Display for ActionError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(source) => write!(formatter, "federation data error: {source}"),
            Self::Batch(source) => write!(formatter, "batch service error: {source}"),
            Self::Unmatched(source) => write!(formatter, "no candidate pool: {source}"),
            Self::Malformed { what } => write!(formatter, "malformed payload: {what}"),
        }
    }
}

impl Error for ActionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Data(source) => Some(source),
            Self::Batch(source) => Some(source),
            Self::Unmatched(source) => Some(source),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<FederationDataError> for ActionError {
    fn from(source: FederationDataError) -> Self {
        Self::Data(source)
    }
}

impl From<StorageError> for ActionError {
    fn from(source: StorageError) -> Self {
        Self::Data(FederationDataError::from(source))
    }
}

impl From<BatchError> for ActionError {
    fn from(source: BatchError) -> Self {
        Self::Batch(source)
    }
}

impl From<FederationError> for ActionError {
    fn from(source: FederationError) -> Self {
        Self::Unmatched(source)
    }
}
