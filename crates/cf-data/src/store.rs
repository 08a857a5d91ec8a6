//! Generic entity/blob/lease/queue store backing the object-store emulation
//! used throughout the platform (see the "object-store layout" table
//! describing tables, queues, and blob containers).
//!
//! A single physical `entities` table stands in for the many logical tables
//! the platform needs (pools, locations, sequences, blocked actions,
//! services, torrentinfo, ...); callers pick them apart with a `table_name`
//! namespace. This mirrors the teacher's stored-procedure-call style
//! (parameterized queries wrapped in small, named methods) without needing a
//! bespoke procedure per logical table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::error::{DataError, Result};

/// A single row in the generic entity table.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Partition key (typically a federation id, pool id, or resource hash).
    pub partition_key: String,
    /// Row key, unique within the partition.
    pub row_key: String,
    /// Arbitrary JSON properties carried by the entity.
    pub properties: Value,
    /// Optimistic-concurrency token. Must be echoed back on update/delete.
    pub etag: Uuid,
    /// Last-write timestamp.
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct EntityRow {
    partition_key: String,
    row_key: String,
    properties: Value,
    etag: Uuid,
    updated_at: DateTime<Utc>,
}

impl From<EntityRow> for Entity {
    fn from(row: EntityRow) -> Self {
        Self {
            partition_key: row.partition_key,
            row_key: row.row_key,
            properties: row.properties,
            etag: row.etag,
            updated_at: row.updated_at,
        }
    }
}

/// A message popped from a logical queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Opaque message identifier.
    pub id: i64,
    /// Message body (typically a JSON-encoded action message, §6).
    pub body: String,
    /// Receipt handle required to delete or extend visibility of this dequeue.
    pub receipt: Uuid,
}

/// Shared Postgres-backed store for entities, blobs, leases, and queues.
#[derive(Clone)]
pub struct EntityStore {
    pool: PgPool,
}

impl EntityStore {
    /// Construct a store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch a single entity, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT partition_key, row_key, properties, etag, updated_at \
             FROM entities WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Entity::from))
    }

    /// Fetch every entity within a partition, ordered by row key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT partition_key, row_key, properties, etag, updated_at \
             FROM entities WHERE table_name = $1 AND partition_key = $2 ORDER BY row_key",
        )
        .bind(table)
        .bind(partition_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Entity::from).collect())
    }

    /// Fetch every entity in a logical table, across all partitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query_table(&self, table: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT partition_key, row_key, properties, etag, updated_at \
             FROM entities WHERE table_name = $1 ORDER BY partition_key, row_key",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Entity::from).collect())
    }

    /// Insert a new entity. Fails if one already exists at this key.
    ///
    /// # Errors
    ///
    /// Returns `DataError::AlreadyExists` on a key collision, or a query error.
    pub async fn insert_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
    ) -> Result<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            "INSERT INTO entities (table_name, partition_key, row_key, properties) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (table_name, partition_key, row_key) DO NOTHING \
             RETURNING partition_key, row_key, properties, etag, updated_at",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .bind(&properties)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entity::from).ok_or_else(|| DataError::AlreadyExists {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
        })
    }

    /// Insert-or-merge an entity's properties, shallowly overlaying the
    /// supplied keys onto any existing document. Always succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn merge_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
    ) -> Result<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            "INSERT INTO entities (table_name, partition_key, row_key, properties) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (table_name, partition_key, row_key) \
             DO UPDATE SET properties = entities.properties || excluded.properties, \
                           etag = gen_random_uuid(), \
                           updated_at = now() \
             RETURNING partition_key, row_key, properties, etag, updated_at",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .bind(&properties)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Replace an entity's properties wholesale, enforcing optimistic
    /// concurrency via `expected_etag`.
    ///
    /// # Errors
    ///
    /// Returns `DataError::EtagMismatch` if the entity moved since it was
    /// read (or never existed), or a query error.
    pub async fn update_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        properties: Value,
        expected_etag: Uuid,
    ) -> Result<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            "UPDATE entities SET properties = $4, etag = gen_random_uuid(), updated_at = now() \
             WHERE table_name = $1 AND partition_key = $2 AND row_key = $3 AND etag = $5 \
             RETURNING partition_key, row_key, properties, etag, updated_at",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .bind(&properties)
        .bind(expected_etag)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entity::from).ok_or_else(|| DataError::EtagMismatch {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
        })
    }

    /// Delete an entity. When `expected_etag` is provided, the delete is
    /// conditional on the current etag matching.
    ///
    /// # Errors
    ///
    /// Returns `DataError::EtagMismatch` if a conditional delete's etag does
    /// not match the stored row, or a query error.
    pub async fn delete_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        expected_etag: Option<Uuid>,
    ) -> Result<()> {
        let deleted = if let Some(etag) = expected_etag {
            sqlx::query(
                "DELETE FROM entities \
                 WHERE table_name = $1 AND partition_key = $2 AND row_key = $3 AND etag = $4",
            )
            .bind(table)
            .bind(partition_key)
            .bind(row_key)
            .bind(etag)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "DELETE FROM entities WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
            )
            .bind(table)
            .bind(partition_key)
            .bind(row_key)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if deleted == 0 && expected_etag.is_some() {
            return Err(DataError::EtagMismatch {
                table: table.to_string(),
                partition_key: partition_key.to_string(),
                row_key: row_key.to_string(),
            });
        }
        Ok(())
    }

    /// Store (overwriting) a blob's body.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn put_blob(&self, container: &str, blob_name: &str, body: Vec<u8>) -> Result<()> {
        sqlx::query(
            "INSERT INTO blobs (container, blob_name, body) VALUES ($1, $2, $3) \
             ON CONFLICT (container, blob_name) DO UPDATE SET body = excluded.body, updated_at = now()",
        )
        .bind(container)
        .bind(blob_name)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a blob's body, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_blob(&self, container: &str, blob_name: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT body FROM blobs WHERE container = $1 AND blob_name = $2")
            .bind(container)
            .bind(blob_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>("body")))
    }

    /// Delete a blob, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn delete_blob(&self, container: &str, blob_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM blobs WHERE container = $1 AND blob_name = $2")
            .bind(container)
            .bind(blob_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Acquire a lease on a blob placeholder for `duration`. Returns `None`
    /// if the blob is already leased by someone else and that lease has not
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn acquire_lease(
        &self,
        container: &str,
        blob_name: &str,
        duration: chrono::Duration,
    ) -> Result<Option<Uuid>> {
        let lease_id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO blob_leases (container, blob_name, lease_id, expires_at) \
             VALUES ($1, $2, $3, now() + $4) \
             ON CONFLICT (container, blob_name) DO UPDATE SET \
                 lease_id = excluded.lease_id, expires_at = excluded.expires_at \
             WHERE blob_leases.expires_at IS NULL OR blob_leases.expires_at <= now() \
             RETURNING lease_id",
        )
        .bind(container)
        .bind(blob_name)
        .bind(lease_id)
        .bind(duration)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.get::<Uuid, _>("lease_id")))
    }

    /// Renew a held lease, extending its expiry by `duration` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn renew_lease(
        &self,
        container: &str,
        blob_name: &str,
        lease_id: Uuid,
        duration: chrono::Duration,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE blob_leases SET expires_at = now() + $4 \
             WHERE container = $1 AND blob_name = $2 AND lease_id = $3 AND expires_at > now()",
        )
        .bind(container)
        .bind(blob_name)
        .bind(lease_id)
        .bind(duration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release a held lease immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn release_lease(
        &self,
        container: &str,
        blob_name: &str,
        lease_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE blob_leases SET lease_id = NULL, expires_at = NULL \
             WHERE container = $1 AND blob_name = $2 AND lease_id = $3",
        )
        .bind(container)
        .bind(blob_name)
        .bind(lease_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enqueue a message, optionally deferring its visibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn enqueue(
        &self,
        queue_name: &str,
        body: String,
        initial_delay: Option<chrono::Duration>,
    ) -> Result<i64> {
        let delay = initial_delay.unwrap_or_else(chrono::Duration::zero);
        let row = sqlx::query(
            "INSERT INTO queue_messages (queue_name, body, visible_at) \
             VALUES ($1, $2, now() + $3) RETURNING id",
        )
        .bind(queue_name)
        .bind(body)
        .bind(delay)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Dequeue the oldest currently-visible message, hiding it for
    /// `visibility_timeout`. Returns `None` if the queue has no visible
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn dequeue_visible(
        &self,
        queue_name: &str,
        visibility_timeout: chrono::Duration,
    ) -> Result<Option<QueueMessage>> {
        let receipt = Uuid::new_v4();
        let row = sqlx::query(
            "UPDATE queue_messages SET visible_at = now() + $2, receipt = $3 \
             WHERE id = ( \
                 SELECT id FROM queue_messages \
                 WHERE queue_name = $1 AND visible_at <= now() \
                 ORDER BY id ASC LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, body",
        )
        .bind(queue_name)
        .bind(visibility_timeout)
        .bind(receipt)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| QueueMessage {
            id: row.get::<i64, _>("id"),
            body: row.get::<String, _>("body"),
            receipt,
        }))
    }

    /// Delete a dequeued message, provided its receipt matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn delete_message(
        &self,
        queue_name: &str,
        id: i64,
        receipt: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM queue_messages WHERE queue_name = $1 AND id = $2 AND receipt = $3",
        )
        .bind(queue_name)
        .bind(id)
        .bind(receipt)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Extend the visibility timeout of an in-flight message.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extend_visibility(
        &self,
        queue_name: &str,
        id: i64,
        receipt: Uuid,
        extra: chrono::Duration,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_messages SET visible_at = now() + $4 \
             WHERE queue_name = $1 AND id = $2 AND receipt = $3",
        )
        .bind(queue_name)
        .bind(id)
        .bind(receipt)
        .bind(extra)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_conversion_preserves_fields() {
        let row = EntityRow {
            partition_key: "fed-1".into(),
            row_key: "pool-1".into(),
            properties: serde_json::json!({"state": "active"}),
            etag: Uuid::nil(),
            updated_at: Utc::now(),
        };
        let entity: Entity = row.into();
        assert_eq!(entity.partition_key, "fed-1");
        assert_eq!(entity.row_key, "pool-1");
        assert_eq!(entity.properties["state"], "active");
    }
}
