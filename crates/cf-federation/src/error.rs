//! Error types for federation matching.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use cf_batch::BatchError;

/// Result alias for federation operations.
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors raised while caching, filtering, or matching against a federation.
#[derive(Debug)]
pub enum FederationError {
    /// No surviving pool could accommodate the action; it was deferred.
    NoCandidatePool {
        /// Target job/job-schedule id.
        target: String,
        /// Reason the deferral happened (last filter failure, or "no pools").
        reason: String,
    },
    /// The batch service rejected a submission.
    Batch(BatchError),
}

impl Display for FederationError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidatePool { target, reason } => {
                write!(formatter, "no candidate pool for target {target}: {reason}")
            }
            Self::Batch(source) => write!(formatter, "batch service error: {source}"),
        }
    }
}

impl Error for FederationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Batch(source) => Some(source),
            Self::NoCandidatePool { .. } => None,
        }
    }
}

impl From<BatchError> for FederationError {
    fn from(source: BatchError) -> Self {
        Self::Batch(source)
    }
}
