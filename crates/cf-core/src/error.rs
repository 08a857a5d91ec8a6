//! Error types shared by the domain model.

use thiserror::Error;

/// Errors raised while constructing or validating domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An action payload failed schema validation.
    #[error("invalid action payload: {reason}")]
    InvalidPayload {
        /// Human-readable reason the payload was rejected.
        reason: String,
    },
    /// The message carried an unrecognized schema version.
    #[error("unrecognized message version {version}")]
    UnrecognizedVersion {
        /// Version string carried on the wire.
        version: String,
    },
    /// A resource identifier did not match the expected `docker:`/`singularity:` shape.
    #[error("malformed resource identifier: {value}")]
    MalformedResource {
        /// Offending value.
        value: String,
    },
}

/// Convenience alias for domain-model results.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_payload_display() {
        let err = CoreError::InvalidPayload {
            reason: "missing target".into(),
        };
        assert_eq!(err.to_string(), "invalid action payload: missing target");
    }
}
