//! Error types for the cascade torrent engine.
//!
//! Error messages are kept constant; operational context lives in fields so
//! callers can match on it without parsing strings.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Result type returned by engine operations.
pub type CascadeEngineResult<T> = Result<T, CascadeEngineError>;

#[derive(Debug)]
/// Errors raised while bootstrapping DHT, adding/removing resources, or
/// persisting fast-resume state.
pub enum CascadeEngineError {
    /// A required field was missing from a request payload.
    MissingField {
        /// Field name that was missing.
        field: &'static str,
    },
    /// A request contained an invalid field value.
    InvalidInput {
        /// Field name with an invalid value.
        field: &'static str,
        /// Static reason describing the invalid value.
        reason: &'static str,
    },
    /// The torrent session was unavailable for the requested operation.
    SessionUnavailable {
        /// Operation that could not be serviced.
        operation: &'static str,
    },
    /// A native session call reported a failure.
    NativeFailure {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Native error message payload.
        message: String,
    },
    /// A roster/services table lookup failed.
    Storage(#[allow(unused)] cf_storage::StorageError),
    /// A fastresume store IO operation failed.
    StoreIo {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A fastresume store parse operation failed.
    StoreParse {
        /// Operation that triggered the parse failure.
        operation: &'static str,
        /// Path involved in the parse failure.
        path: PathBuf,
        /// Underlying JSON parse error.
        source: serde_json::Error,
    },
}

impl Display for CascadeEngineError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                let _ = field;
                formatter.write_str("required field missing")
            }
            Self::InvalidInput { field, reason } => {
                let _ = (field, reason);
                formatter.write_str("invalid engine input")
            }
            Self::SessionUnavailable { operation } => {
                let _ = operation;
                formatter.write_str("torrent session unavailable")
            }
            Self::NativeFailure { operation, message } => {
                let _ = (operation, message);
                formatter.write_str("native session error")
            }
            Self::Storage(_) => formatter.write_str("dht roster storage failure"),
            Self::StoreIo { operation, path, .. } => {
                let _ = (operation, path);
                formatter.write_str("fastresume store IO failure")
            }
            Self::StoreParse { operation, path, .. } => {
                let _ = (operation, path);
                formatter.write_str("fastresume store parse failure")
            }
        }
    }
}

impl Error for CascadeEngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(source) => Some(source),
            Self::StoreIo { source, .. } => Some(source),
            Self::StoreParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<cf_storage::StorageError> for CascadeEngineError {
    fn from(source: cf_storage::StorageError) -> Self {
        Self::Storage(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;
    use std::io;

    fn json_error() -> serde_json::Error {
        match serde_json::from_str::<serde_json::Value>("invalid") {
            Ok(_) => serde_json::Error::custom("expected invalid json"),
            Err(err) => err,
        }
    }

    #[test]
    fn display_and_source_are_stable() {
        let cases: Vec<(CascadeEngineError, &str, bool)> = vec![
            (
                CascadeEngineError::MissingField { field: "resource_hash" },
                "required field missing",
                false,
            ),
            (
                CascadeEngineError::InvalidInput { field: "listen_port", reason: "out of range" },
                "invalid engine input",
                false,
            ),
            (
                CascadeEngineError::SessionUnavailable { operation: "add_resource" },
                "torrent session unavailable",
                false,
            ),
            (
                CascadeEngineError::NativeFailure {
                    operation: "add_resource",
                    message: "native error".to_string(),
                },
                "native session error",
                false,
            ),
            (
                CascadeEngineError::StoreIo {
                    operation: "read",
                    path: PathBuf::from("store"),
                    source: io::Error::other("io"),
                },
                "fastresume store IO failure",
                true,
            ),
            (
                CascadeEngineError::StoreParse {
                    operation: "parse",
                    path: PathBuf::from("store"),
                    source: json_error(),
                },
                "fastresume store parse failure",
                true,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }
}
