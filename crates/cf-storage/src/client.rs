//! StorageClient (C1): typed wrapper over blob, table, and queue object
//! storage.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Duration as ChronoDuration;
use cf_data::EntityStore;
pub use cf_data::{Entity, QueueMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::backoff::{BackoffPolicy, retry_transient};
use crate::error::{Result, StorageError, is_transient};
use crate::namespace::Namespace;

/// User-agent string attached to every request this client issues (§4.1).
pub const USER_AGENT: &str = concat!("batch-shipyard/", env!("CARGO_PKG_VERSION"));

/// S3-compatible blob backend configuration (`storage.*`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Bucket backing every blob container (containers become key prefixes).
    pub bucket_name: String,
    /// Region passed to the S3 SDK.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Optional custom endpoint for S3-compatible services (`storage.endpoint`).
    pub endpoint_url: Option<String>,
}

impl BlobConfig {
    /// Validate that every required field is non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first empty field encountered.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bucket_name.trim().is_empty() {
            return Err("storage.account must not be empty".to_string());
        }
        if self.region.trim().is_empty() {
            return Err("storage region must not be empty".to_string());
        }
        if self.access_key_id.trim().is_empty() {
            return Err("storage access key id must not be empty".to_string());
        }
        if self.secret_access_key.trim().is_empty() {
            return Err("storage access key must not be empty".to_string());
        }
        Ok(())
    }
}

/// Typed wrapper over blob, table, and queue object storage (C1).
#[derive(Clone)]
pub struct StorageClient {
    entities: EntityStore,
    blobs: S3Client,
    bucket: String,
    namespace: Namespace,
    policy: BackoffPolicy,
}

impl StorageClient {
    /// Construct a storage client over an already-migrated [`EntityStore`]
    /// and an S3-compatible blob backend.
    ///
    /// # Errors
    ///
    /// Returns an error if `blob_config` fails validation.
    pub async fn new(
        entities: EntityStore,
        blob_config: BlobConfig,
        namespace: Namespace,
    ) -> Result<Self> {
        blob_config
            .validate()
            .map_err(|message| StorageError::Blob {
                operation: "configure",
                message,
            })?;

        let credentials = Credentials::new(
            blob_config.access_key_id,
            blob_config.secret_access_key,
            None,
            None,
            "cf-storage",
        );
        let mut builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(blob_config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = blob_config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        let config = builder.load().await;
        let blobs = S3Client::new(&config);

        Ok(Self {
            entities,
            blobs,
            bucket: blob_config.bucket_name,
            namespace,
            policy: BackoffPolicy::storage(),
        })
    }

    /// The namespace this client builds container/table/queue names through.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn blob_key(container: &str, name: &str) -> String {
        format!("{container}/{name}")
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, cf_data::DataError>>,
    {
        let mut attempts = 0;
        let result = retry_transient(
            &self.policy,
            |err: &cf_data::DataError| {
                attempts += 1;
                is_transient(err)
            },
            &mut op,
        )
        .await;
        result.map_err(|source| {
            if is_transient(&source) {
                StorageError::Transient { attempts, source }
            } else {
                StorageError::from(source)
            }
        })
    }

    // ---- Entities -------------------------------------------------------

    /// Fetch a single entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>> {
        self.with_retry(|| self.entities.get_entity(table, partition_key, row_key))
            .await
    }

    /// Query every entity within a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn query_entities(&self, table: &str, partition_key: &str) -> Result<Vec<Entity>> {
        self.with_retry(|| self.entities.query_partition(table, partition_key))
            .await
    }

    /// Insert a new entity, failing if one already exists at this key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` on a key collision.
    pub async fn insert(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
    ) -> Result<Entity> {
        self.with_retry(|| {
            self.entities
                .insert_entity(table, partition_key, row_key, properties.clone())
        })
        .await
    }

    /// Insert-or-merge an entity's properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn merge(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
    ) -> Result<Entity> {
        self.with_retry(|| {
            self.entities
                .merge_entity(table, partition_key, row_key, properties.clone())
        })
        .await
    }

    /// Replace an entity's properties, enforcing if-match semantics:
    /// fails iff the stored etag differs from `expected_etag` (§4.1).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the etag does not match.
    pub async fn update(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
        expected_etag: Uuid,
    ) -> Result<Entity> {
        self.with_retry(|| {
            self.entities
                .update_entity(table, partition_key, row_key, properties.clone(), expected_etag)
        })
        .await
    }

    /// Delete an entity, optionally enforcing if-match semantics.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a conditional delete's etag does
    /// not match.
    pub async fn delete(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        expected_etag: Option<Uuid>,
    ) -> Result<()> {
        self.with_retry(|| {
            self.entities
                .delete_entity(table, partition_key, row_key, expected_etag)
        })
        .await
    }

    // ---- Leases -----------------------------------------------------------

    /// Acquire a lease on a blob placeholder for `duration_s` seconds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LeaseUnavailable` if the blob is already
    /// leased and unexpired.
    pub async fn acquire_lease(
        &self,
        container: &str,
        blob_name: &str,
        duration_s: i64,
    ) -> Result<Uuid> {
        let lease = self
            .with_retry(|| {
                self.entities
                    .acquire_lease(container, blob_name, ChronoDuration::seconds(duration_s))
            })
            .await?;
        lease.ok_or_else(|| StorageError::LeaseUnavailable {
            container: container.to_string(),
            blob_name: blob_name.to_string(),
        })
    }

    /// Renew a held lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn renew_lease(
        &self,
        container: &str,
        blob_name: &str,
        lease_id: Uuid,
        duration_s: i64,
    ) -> Result<bool> {
        self.with_retry(|| {
            self.entities
                .renew_lease(container, blob_name, lease_id, ChronoDuration::seconds(duration_s))
        })
        .await
    }

    /// Release a held lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn release_lease(&self, container: &str, blob_name: &str, lease_id: Uuid) -> Result<()> {
        self.with_retry(|| self.entities.release_lease(container, blob_name, lease_id))
            .await
    }

    // ---- Queue --------------------------------------------------------

    /// Enqueue a message, becoming visible after `visibility_timeout_s`
    /// seconds (0 for immediately visible).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn put_message(
        &self,
        queue: &str,
        body: String,
        visibility_timeout_s: i64,
    ) -> Result<i64> {
        self.with_retry(|| {
            self.entities.enqueue(
                queue,
                body.clone(),
                Some(ChronoDuration::seconds(visibility_timeout_s)),
            )
        })
        .await
    }

    /// Fetch up to `n` currently-visible messages, hiding each for
    /// `visibility_timeout_s` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn get_messages(
        &self,
        queue: &str,
        n: usize,
        visibility_timeout_s: i64,
    ) -> Result<Vec<QueueMessage>> {
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            let popped = self
                .with_retry(|| self.entities.dequeue_visible(queue, ChronoDuration::seconds(visibility_timeout_s)))
                .await?;
            match popped {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        Ok(messages)
    }

    /// Extend a dequeued message's visibility timeout by `extra_s` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn update_message(
        &self,
        queue: &str,
        id: i64,
        receipt: Uuid,
        extra_s: i64,
    ) -> Result<bool> {
        self.with_retry(|| self.entities.extend_visibility(queue, id, receipt, ChronoDuration::seconds(extra_s)))
            .await
    }

    /// Delete a dequeued message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails after retries.
    pub async fn delete_message(&self, queue: &str, id: i64, receipt: Uuid) -> Result<bool> {
        self.with_retry(|| self.entities.delete_message(queue, id, receipt))
            .await
    }

    // ---- Blobs ----------------------------------------------------------

    /// Upload (overwriting) a blob's body.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blob` if the S3-compatible backend rejects
    /// the request.
    pub async fn upload_blob(&self, container: &str, name: &str, body: Vec<u8>) -> Result<()> {
        let key = Self::blob_key(container, name);
        self.blobs
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::Blob {
                operation: "upload",
                message: err.to_string(),
            })?;
        Ok(())
    }

    /// Download a blob's body, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blob` for any failure other than a missing key.
    pub async fn download_blob_to_bytes(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let key = Self::blob_key(container, name);
        let response = self.blobs.get_object().bucket(&self.bucket).key(&key).send().await;
        let response = match response {
            Ok(response) => response,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Ok(None);
            }
            Err(err) => {
                return Err(StorageError::Blob {
                    operation: "download",
                    message: err.to_string(),
                });
            }
        };
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Blob {
                operation: "download",
                message: err.to_string(),
            })?
            .into_bytes()
            .to_vec();
        Ok(Some(bytes))
    }

    /// Delete a blob, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blob` if the backend rejects the request.
    pub async fn delete_blob(&self, container: &str, name: &str) -> Result<()> {
        let key = Self::blob_key(container, name);
        self.blobs
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| StorageError::Blob {
                operation: "delete",
                message: err.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_key_joins_container_and_name() {
        assert_eq!(
            StorageClient::blob_key("gr-acct-pool1", "0.lock"),
            "gr-acct-pool1/0.lock"
        );
    }

    #[test]
    fn blob_config_rejects_empty_fields() {
        let config = BlobConfig {
            bucket_name: String::new(),
            region: "us-east-1".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            endpoint_url: None,
        };
        assert!(config.validate().is_err());
    }
}
