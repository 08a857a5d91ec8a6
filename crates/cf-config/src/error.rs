//! Configuration load errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading, or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read from disk.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The document is neither valid YAML nor valid JSON.
    #[error("failed to parse configuration file {path} as YAML or JSON: {yaml_source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Error from the YAML parser, which is attempted first.
        yaml_source: serde_yaml::Error,
    },
    /// A required field was missing or empty.
    #[error("configuration field {section}.{field} is required")]
    MissingField {
        /// Key group the field belongs to.
        section: &'static str,
        /// Field name within the group.
        field: &'static str,
    },
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
