//! Errors raised by the batch-service client.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for batch-service operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors raised by [`crate::BatchClient`].
#[derive(Debug)]
pub enum BatchError {
    /// The request transport failed (connection reset, timeout, DNS, ...).
    Transport(reqwest::Error),
    /// The service returned a 401/403 and credential re-acquisition was
    /// exhausted (§4.2, 10 attempts).
    AuthenticationExhausted,
    /// The service returned a 4xx other than 404/409 that callers must
    /// surface rather than retry.
    ClientError {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: String,
    },
    /// `add_job`/`add_job_schedule` found an existing target whose
    /// configuration is incompatible with the requested one (§4.2).
    Incompatible {
        /// Target job/job-schedule id.
        id: String,
        /// Which field differed.
        field: &'static str,
    },
    /// A bulk task add's chunk could not be reduced below 1 task and still
    /// failed with `RequestBodyTooLarge`.
    ChunkTooLarge,
}

impl Display for BatchError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(source) => write!(formatter, "batch service transport error: {source}"),
            Self::AuthenticationExhausted => {
                write!(formatter, "exhausted credential re-acquisition attempts")
            }
            Self::ClientError { status, body } => {
                write!(formatter, "batch service rejected request ({status}): {body}")
            }
            Self::Incompatible { id, field } => {
                write!(formatter, "existing target {id} is incompatible on field {field}")
            }
            Self::ChunkTooLarge => write!(formatter, "task chunk of size 1 still too large for the service"),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BatchError {
    fn from(source: reqwest::Error) -> Self {
        Self::Transport(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_display_names_the_field() {
        let err = BatchError::Incompatible {
            id: "job-1".into(),
            field: "pool_id",
        };
        assert!(err.to_string().contains("pool_id"));
    }
}
