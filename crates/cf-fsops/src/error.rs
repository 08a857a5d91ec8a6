//! Errors raised by the cascade image driver (§4.7).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for image-driver operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while pulling, packaging, loading, or registering a resource.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem or spawning a process.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A tar archive could not be read or written.
    #[error("fsops archive failure")]
    Archive {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A shelled-out command exited non-zero.
    #[error("fsops process failure")]
    Process {
        /// Command that failed.
        command: &'static str,
        /// Exit status code, when the process was signalled rather than exited normally.
        status: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
    /// A registry pull failed without matching any known-transient pattern;
    /// the caller should not retry (§4.7 step 3).
    #[error("fsops registry pull failed")]
    RegistryPullFailed {
        /// Image reference that failed to pull.
        image: String,
        /// Captured stderr.
        message: String,
    },
    /// A registry pull failed with a known-transient pattern; used internally
    /// to drive the retry loop and only escapes it once the backoff budget
    /// is exhausted.
    #[error("fsops registry pull failed transiently")]
    RegistryPullTransient {
        /// Image reference that failed to pull.
        image: String,
        /// Captured stderr.
        message: String,
    },
    /// A services or torrent-info row could not be decoded.
    #[error("fsops malformed entity")]
    MalformedEntity {
        /// Table the entity was read from.
        table: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Object-store access failed.
    #[error("fsops storage failure")]
    Storage(#[from] cf_storage::StorageError),
    /// A `.torrent` file could not be built from a materialized artifact.
    #[error("fsops torrent encoding failure")]
    TorrentEncode {
        /// Path to the artifact the torrent describes.
        path: PathBuf,
        /// Underlying bencode error.
        source: serde_bencode::Error,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Archive {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn io_helper_builds_variant_with_source() {
        let err = FsOpsError::io("read", "path", io::Error::other("boom"));
        assert!(matches!(err, FsOpsError::Io { .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn storage_error_wraps_via_from() {
        let source = cf_storage::StorageError::NotFound { what: "row".into() };
        let err: FsOpsError = source.into();
        assert!(matches!(err, FsOpsError::Storage(_)));
        assert!(err.source().is_some());
    }
}
