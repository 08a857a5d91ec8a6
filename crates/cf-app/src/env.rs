//! Environment and CLI argument parsing for the two daemon binaries (§6
//! "Environment").
//!
//! # Design
//!
//! - The federation controller needs only `AZ_BATCH_NODE_ID`; its storage
//!   credentials and entity prefix live entirely in the configuration file.
//! - The cascade node additionally needs `AZ_BATCH_NODE_ROOT_DIR` (scratch
//!   space root), the batch account/pool identifying its roster/services
//!   partition, and a `p2popts=` positional argument. `AZ_BATCH_ACCOUNT_NAME`
//!   and `AZ_BATCH_POOL_ID` are not named in §6 but are standard Azure Batch
//!   node environment variables present alongside `AZ_BATCH_NODE_ID` on every
//!   compute node; see `DESIGN.md` for this resolution.
//! - `SHIPYARD_STORAGE_ENV=account:endpoint:key` supplies storage credentials
//!   from the environment instead of the configuration file (`storage.account_key`'s
//!   doc comment in `cf-config` describes this split explicitly).

use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Default path to the configuration document when neither a CLI argument
/// nor `CASCADEFED_CONFIG_PATH` is set.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn require_env(name: &'static str) -> AppResult<String> {
    std::env::var(name).map_err(|_| AppError::MissingEnv { name })
}

/// Resolves the configuration file path: `args[1]` if present, else
/// `CASCADEFED_CONFIG_PATH`, else [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn config_path(positional: Option<&str>) -> PathBuf {
    positional
        .map(PathBuf::from)
        .or_else(|| std::env::var("CASCADEFED_CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Environment required to bootstrap the federation controller daemon.
pub struct ControllerEnv {
    /// This controller process's node id.
    pub node_id: String,
    /// Azure subscription id, when supplied (§6 "credentials for its cloud").
    pub subscription_id: Option<String>,
}

impl ControllerEnv {
    /// Reads the controller's required/optional environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingEnv`] if `AZ_BATCH_NODE_ID` is unset.
    pub fn from_process() -> AppResult<Self> {
        Ok(Self {
            node_id: require_env("AZ_BATCH_NODE_ID")?,
            subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
        })
    }
}

/// Environment required to bootstrap the cascade node daemon.
pub struct NodeEnv {
    /// This node's id.
    pub node_id: String,
    /// Batch account this node belongs to (partitions the roster/services/manifest tables).
    pub batch_account: String,
    /// Pool id this node belongs to.
    pub pool_id: String,
    /// Root directory the batch node agent mounted for this node's shared state.
    pub node_root_dir: PathBuf,
    /// Singularity image cache directory, when set.
    pub singularity_cachedir: Option<PathBuf>,
    /// Storage credential override, when `SHIPYARD_STORAGE_ENV` is set.
    pub storage_override: Option<StorageEnvOverride>,
}

impl NodeEnv {
    /// Reads the cascade node's required/optional environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingEnv`] if a required variable is unset, or
    /// [`AppError::InvalidConfig`] if `SHIPYARD_STORAGE_ENV` is malformed.
    pub fn from_process() -> AppResult<Self> {
        let storage_override = match std::env::var("SHIPYARD_STORAGE_ENV") {
            Ok(raw) => Some(StorageEnvOverride::parse(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            node_id: require_env("AZ_BATCH_NODE_ID")?,
            batch_account: require_env("AZ_BATCH_ACCOUNT_NAME")?,
            pool_id: require_env("AZ_BATCH_POOL_ID")?,
            node_root_dir: PathBuf::from(require_env("AZ_BATCH_NODE_ROOT_DIR")?),
            singularity_cachedir: std::env::var("SINGULARITY_CACHEDIR").ok().map(PathBuf::from),
            storage_override,
        })
    }
}

/// Parsed `SHIPYARD_STORAGE_ENV=account:endpoint:key` (§6).
pub struct StorageEnvOverride {
    /// Storage account name.
    pub account: String,
    /// Storage endpoint.
    pub endpoint: String,
    /// Storage account key.
    pub key: String,
}

impl StorageEnvOverride {
    fn parse(raw: &str) -> AppResult<Self> {
        let mut parts = raw.splitn(3, ':');
        let (Some(account), Some(endpoint), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AppError::InvalidConfig {
                field: "SHIPYARD_STORAGE_ENV",
                reason: "expected account:endpoint:key",
                value: Some(raw.to_string()),
            });
        };
        if account.is_empty() || key.is_empty() {
            return Err(AppError::InvalidConfig {
                field: "SHIPYARD_STORAGE_ENV",
                reason: "account and key must be non-empty",
                value: Some(raw.to_string()),
            });
        }
        Ok(Self {
            account: account.to_string(),
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        })
    }
}

/// Parsed `p2popts=enabled:concurrent_downloads:seed_bias:compression` (§6).
pub struct P2pOptions {
    /// Whether this node participates in peer-to-peer distribution at all.
    pub enabled: bool,
    /// Pull/package concurrency and compression settings (§4.7).
    pub pull: cf_fsops::PullOptions,
}

impl P2pOptions {
    /// Parses the `p2popts=` positional argument.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] if the argument is missing the
    /// `p2popts=` prefix, has the wrong number of fields, or a field fails to
    /// parse as its expected type.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let body = raw.strip_prefix("p2popts=").ok_or_else(|| AppError::InvalidConfig {
            field: "p2popts",
            reason: "expected a p2popts=... positional argument",
            value: Some(raw.to_string()),
        })?;

        let fields: Vec<&str> = body.split(':').collect();
        let [enabled, concurrent_downloads, seed_bias, compression] = fields.as_slice() else {
            return Err(AppError::InvalidConfig {
                field: "p2popts",
                reason: "expected enabled:concurrent_downloads:seed_bias:compression",
                value: Some(raw.to_string()),
            });
        };

        let parse_bool = |field: &'static str, value: &str| -> AppResult<bool> {
            match value {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                other => Err(AppError::InvalidConfig {
                    field,
                    reason: "expected a boolean (0/1/true/false)",
                    value: Some(other.to_string()),
                }),
            }
        };
        let parse_num = |field: &'static str, value: &str| -> AppResult<u32> {
            value.parse::<u32>().map_err(|_| AppError::InvalidConfig {
                field,
                reason: "expected an unsigned integer",
                value: Some(value.to_string()),
            })
        };

        Ok(Self {
            enabled: parse_bool("p2popts.enabled", enabled)?,
            pull: cf_fsops::PullOptions {
                concurrent_downloads: parse_num("p2popts.concurrent_downloads", concurrent_downloads)? as usize,
                seed_bias: parse_num("p2popts.seed_bias", seed_bias)?,
                compression: parse_bool("p2popts.compression", compression)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_env_override_parses_three_fields() {
        let parsed = StorageEnvOverride::parse("myaccount:core.windows.net:secretkey").unwrap();
        assert_eq!(parsed.account, "myaccount");
        assert_eq!(parsed.endpoint, "core.windows.net");
        assert_eq!(parsed.key, "secretkey");
    }

    #[test]
    fn storage_env_override_rejects_missing_fields() {
        assert!(StorageEnvOverride::parse("myaccount:core.windows.net").is_err());
    }

    #[test]
    fn p2p_options_parses_well_formed_argument() {
        let parsed = P2pOptions::parse("p2popts=1:4:3:true").unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.pull.concurrent_downloads, 4);
        assert_eq!(parsed.pull.seed_bias, 3);
        assert!(parsed.pull.compression);
    }

    #[test]
    fn p2p_options_rejects_missing_prefix() {
        assert!(P2pOptions::parse("1:4:3:true").is_err());
    }

    #[test]
    fn p2p_options_rejects_wrong_field_count() {
        assert!(P2pOptions::parse("p2popts=1:4:3").is_err());
    }

    #[test]
    fn config_path_prefers_positional_argument() {
        assert_eq!(config_path(Some("/etc/cascadefed.yaml")), PathBuf::from("/etc/cascadefed.yaml"));
    }
}
