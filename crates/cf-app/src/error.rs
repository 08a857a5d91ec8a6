//! # Design
//!
//! - Centralize application-level errors for bootstrap and orchestration.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: cf_config::ConfigError,
    },
    /// Telemetry initialisation failed. `init_logging_with_otel` returns
    /// `anyhow::Error`, which does not implement `std::error::Error`, so the
    /// message is captured rather than chained.
    #[error("telemetry operation failed: {message}")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Rendered source error message.
        message: String,
    },
    /// Database connection or migration setup failed.
    #[error("database operation failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source sqlx error.
        source: sqlx::Error,
    },
    /// Entity store access or migration failed.
    #[error("data store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: cf_data::DataError,
    },
    /// Object-store client construction or access failed.
    #[error("storage operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Source storage error.
        source: cf_storage::StorageError,
    },
    /// Federation/pool persistence operations failed.
    #[error("federation data operation failed")]
    FederationData {
        /// Operation identifier.
        operation: &'static str,
        /// Source federation data error.
        source: cf_federation_data::FederationDataError,
    },
    /// The periodic scheduler failed to reconcile its registry.
    #[error("scheduler operation failed")]
    Scheduler {
        /// Operation identifier.
        operation: &'static str,
        /// Source scheduler error.
        source: cf_scheduler::SchedulerError,
    },
    /// The cascade torrent session reported a failure. `CascadeTorrentEngine`
    /// returns `anyhow::Error`, which does not implement `std::error::Error`,
    /// so the message is captured rather than chained.
    #[error("cascade engine operation failed: {message}")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Rendered source error message.
        message: String,
    },
    /// Filesystem post-processing operations failed.
    #[error("filesystem post-processing failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: cf_fsops::FsOpsError,
    },
    /// Runtime fast-resume persistence failed. `RuntimeStore` returns
    /// `anyhow::Error`, so the message is captured rather than chained.
    #[error("runtime persistence failed: {message}")]
    Runtime {
        /// Operation identifier.
        operation: &'static str,
        /// Rendered source error message.
        message: String,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration or environment values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: cf_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, source: &anyhow::Error) -> Self {
        Self::Telemetry {
            operation,
            message: source.to_string(),
        }
    }

    pub(crate) const fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: cf_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn storage(operation: &'static str, source: cf_storage::StorageError) -> Self {
        Self::Storage { operation, source }
    }

    pub(crate) const fn federation_data(
        operation: &'static str,
        source: cf_federation_data::FederationDataError,
    ) -> Self {
        Self::FederationData { operation, source }
    }

    pub(crate) const fn scheduler(operation: &'static str, source: cf_scheduler::SchedulerError) -> Self {
        Self::Scheduler { operation, source }
    }

    pub(crate) fn engine(operation: &'static str, source: &anyhow::Error) -> Self {
        Self::Engine {
            operation,
            message: source.to_string(),
        }
    }

    pub(crate) const fn fsops(operation: &'static str, source: cf_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) fn runtime(operation: &'static str, source: &anyhow::Error) -> Self {
        Self::Runtime {
            operation,
            message: source.to_string(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io { operation, path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            cf_config::ConfigError::MissingField {
                section: "storage",
                field: "account",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));

        let storage = AppError::storage(
            "open",
            cf_storage::StorageError::NotFound {
                what: "fedglobal row".to_string(),
            },
        );
        assert!(matches!(storage, AppError::Storage { .. }));

        let engine_source = anyhow::anyhow!("session unavailable");
        let engine = AppError::engine("add_resource", &engine_source);
        assert!(matches!(engine, AppError::Engine { .. }));
        assert!(engine.to_string().contains("session unavailable"));

        let runtime_source = anyhow::anyhow!("store io failure");
        let runtime = AppError::runtime("load_resources", &runtime_source);
        assert!(matches!(runtime, AppError::Runtime { .. }));
        assert!(runtime.to_string().contains("store io failure"));

        let fsops = AppError::fsops(
            "pull",
            cf_fsops::FsOpsError::RegistryPullFailed {
                image: "alpine:3.19".to_string(),
                message: "not found".to_string(),
            },
        );
        assert!(matches!(fsops, AppError::FsOps { .. }));
    }
}
