//! Service wiring shared by both daemon binaries: logging, the Postgres
//! pool, and the storage client. Each binary's own module (`controller.rs`,
//! `node.rs`) owns the pieces that differ between them.

use cf_config::{ResolvedConfig, StorageConfig};
use cf_storage::{BlobConfig, Namespace, StorageClient};
use cf_telemetry::{LogFormat, LoggingGuard, OpenTelemetryConfig, build_sha, init_logging_with_otel};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{AppError, AppResult};
use crate::env::StorageEnvOverride;

/// Default Postgres connection string when `DATABASE_URL` is unset, matching
/// a local development instance.
const DEFAULT_DATABASE_URL: &str = "postgres://postgres@localhost/cascadefed";

/// Default S3-compatible region passed to the blob backend when the
/// configuration carries no region concept of its own (storage accounts in
/// §6 have no region field; see `DESIGN.md`).
const DEFAULT_BLOB_REGION: &str = "us-east-1";

/// Installs the tracing subscriber for `resolved.logging`.
///
/// # Errors
///
/// Returns [`AppError::Telemetry`] if the subscriber cannot be installed.
pub fn init_app_logging(resolved: &ResolvedConfig) -> AppResult<LoggingGuard> {
    let logging = cf_telemetry::LoggingConfig {
        level: &resolved.logging.level,
        format: LogFormat::infer(),
        build_sha: build_sha(),
        persistence: resolved
            .logging
            .persistence
            .then(|| resolved.logging.filename.clone())
            .flatten()
            .map(Into::into),
    };
    let otel = OpenTelemetryConfig {
        enabled: false,
        service_name: "cascadefed".into(),
        endpoint: None,
    };
    init_logging_with_otel(&logging, Some(&otel)).map_err(|source| AppError::telemetry("init_logging", &source))
}

/// Opens a Postgres connection pool from `DATABASE_URL` (falling back to a
/// local default), applying pending migrations for every dependent store is
/// the caller's job ([`cf_data::EntityStore::new`], [`cf_runtime::RuntimeStore::new`]).
///
/// # Errors
///
/// Returns [`AppError::Database`] if the pool cannot be established.
pub async fn connect_postgres() -> AppResult<PgPool> {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .map_err(|source| AppError::database("connect", source))
}

/// Builds the S3-compatible [`BlobConfig`] this process' [`StorageClient`]
/// connects through, applying `override_creds` (from `SHIPYARD_STORAGE_ENV`)
/// over the configuration file's `storage.*` values when present.
///
/// `storage.account` doubles as both the blob bucket name and the access key
/// id (mirroring how a cloud storage account name is both the namespace and
/// the credential identity); `storage.account_key`/`override_creds.key` is the
/// secret access key. See `DESIGN.md` for this field mapping.
#[must_use]
pub fn blob_config_from(storage: &StorageConfig, override_creds: Option<&StorageEnvOverride>) -> BlobConfig {
    let account = override_creds.map_or_else(|| storage.account.clone(), |creds| creds.account.clone());
    let endpoint_url = override_creds
        .map(|creds| creds.endpoint.clone())
        .or_else(|| storage.endpoint.clone());
    let secret_access_key = override_creds
        .map(|creds| creds.key.clone())
        .or_else(|| storage.account_key.clone())
        .unwrap_or_default();

    BlobConfig {
        bucket_name: account.clone(),
        region: DEFAULT_BLOB_REGION.to_string(),
        access_key_id: account,
        secret_access_key,
        endpoint_url,
    }
}

/// Builds the namespace this process' [`StorageClient`] builds container/table
/// names through.
#[must_use]
pub fn namespace_from(storage: &StorageConfig) -> Namespace {
    Namespace::new(storage.entity_prefix.clone())
}

/// Constructs the storage client from a resolved configuration and optional
/// environment credential override.
///
/// # Errors
///
/// Returns [`AppError::Data`] if the entity store cannot be migrated, or
/// [`AppError::Storage`] if the blob backend rejects the resolved configuration.
pub async fn build_storage_client(
    resolved: &ResolvedConfig,
    pool: PgPool,
    override_creds: Option<&StorageEnvOverride>,
) -> AppResult<StorageClient> {
    let entities = cf_data::EntityStore::new(pool)
        .await
        .map_err(|source| AppError::data("entity_store.new", source))?;
    let blob_config = blob_config_from(&resolved.storage, override_creds);
    let namespace = namespace_from(&resolved.storage);
    StorageClient::new(entities, blob_config, namespace)
        .await
        .map_err(|source| AppError::storage("storage_client.new", source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_config::StorageConfig;

    fn storage_config() -> StorageConfig {
        StorageConfig {
            account: "myaccount".to_string(),
            account_key: Some("filekey".to_string()),
            endpoint: Some("core.windows.net".to_string()),
            resource_group: None,
            entity_prefix: "cf".to_string(),
        }
    }

    #[test]
    fn blob_config_uses_file_credentials_without_override() {
        let config = blob_config_from(&storage_config(), None);
        assert_eq!(config.bucket_name, "myaccount");
        assert_eq!(config.secret_access_key, "filekey");
        assert_eq!(config.endpoint_url.as_deref(), Some("core.windows.net"));
    }

    #[test]
    fn blob_config_prefers_environment_override() {
        let override_creds = StorageEnvOverride {
            account: "envaccount".to_string(),
            endpoint: "s3.example.com".to_string(),
            key: "envkey".to_string(),
        };
        let config = blob_config_from(&storage_config(), Some(&override_creds));
        assert_eq!(config.bucket_name, "envaccount");
        assert_eq!(config.secret_access_key, "envkey");
        assert_eq!(config.endpoint_url.as_deref(), Some("s3.example.com"));
    }

    #[test]
    fn namespace_from_uses_entity_prefix() {
        let namespace = namespace_from(&storage_config());
        assert_eq!(namespace.manifest_table(), "cfgr");
    }
}
