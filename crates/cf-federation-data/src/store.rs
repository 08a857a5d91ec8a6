//! FederationData (C3): federations/pools/location/sequence/blocked-action
//! persistence and blob-data retrieval over [`cf_storage::StorageClient`].

use cf_core::hashing::{federation_hash, job_location_partition, job_location_row_key, target_hash};
use cf_storage::{Entity, Namespace, StorageClient};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FederationDataError, Result};
use crate::sequence;

const ACTIONS_PARTITION_PREFIX: &str = "actions";
const BLOCKED_PARTITION_PREFIX: &str = "blocked";
const FEDERATION_PARTITION: &str = "federation";

fn pools_partition(fedhash: &str) -> String {
    format!("pools${fedhash}")
}

fn actions_partition(fedhash: &str) -> String {
    format!("{ACTIONS_PARTITION_PREFIX}${fedhash}")
}

fn blocked_partition(fedhash: &str) -> String {
    format!("{BLOCKED_PARTITION_PREFIX}${fedhash}")
}

/// Federations/pools/location/sequence/blocked-action persistence and the
/// global lease (C3). Backed by two logical tables (`fedglobal`, `fedjobs`)
/// and a blob container, named through a shared [`Namespace`].
#[derive(Clone)]
pub struct FederationData {
    client: StorageClient,
}

impl FederationData {
    /// Wrap an already-constructed storage client.
    #[must_use]
    pub const fn new(client: StorageClient) -> Self {
        Self { client }
    }

    fn namespace(&self) -> &Namespace {
        self.client.namespace()
    }

    /// The underlying storage client.
    #[must_use]
    pub const fn client(&self) -> &StorageClient {
        &self.client
    }

    /// `SHA1(federation_id)`.
    #[must_use]
    pub fn federation_hash(federation_id: &str) -> String {
        federation_hash(federation_id)
    }

    // ---- Federations and pools -----------------------------------------

    /// Every federation entity known to this controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn get_all_federations(&self) -> Result<Vec<Entity>> {
        let table = self.namespace().fedglobal_table();
        Ok(self.client.query_entities(&table, FEDERATION_PARTITION).await?)
    }

    /// Every pool entity registered under `fedhash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn get_all_pools_for_federation(&self, fedhash: &str) -> Result<Vec<Entity>> {
        let table = self.namespace().fedglobal_table();
        Ok(self.client.query_entities(&table, &pools_partition(fedhash)).await?)
    }

    /// One pool entity within a federation, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn get_pool_for_federation(&self, fedhash: &str, poolhash: &str) -> Result<Option<Entity>> {
        let table = self.namespace().fedglobal_table();
        Ok(self
            .client
            .get_entity(&table, &pools_partition(fedhash), poolhash)
            .await?)
    }

    // ---- Sequence ---------------------------------------------------------

    /// Head of the per-target submission sequence, if any (§4.3).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn get_first_sequence_id_for_job(&self, fedhash: &str, target: &str) -> Result<Option<Uuid>> {
        let table = self.namespace().fedjobs_table();
        let entity = self
            .client
            .get_entity(&table, &actions_partition(fedhash), &target_hash(target))
            .await?;
        let Some(entity) = entity else {
            return Ok(None);
        };
        let Value::Object(properties) = &entity.properties else {
            return Ok(None);
        };
        Ok(sequence::first_sequence_id(properties).and_then(|id| id.parse().ok()))
    }

    /// Pops the head sequence id, repacks the remainder, and upserts the
    /// entity (409 on a concurrent writer is retried by the caller). Returns
    /// the updated entity and whether the sequence is now empty (§4.3).
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist or the underlying
    /// query fails.
    pub async fn pop_and_pack_sequence_ids_for_job(&self, fedhash: &str, target: &str) -> Result<(Entity, bool)> {
        let table = self.namespace().fedjobs_table();
        let partition = actions_partition(fedhash);
        let row = target_hash(target);
        let entity = self
            .client
            .get_entity(&table, &partition, &row)
            .await?
            .ok_or_else(|| FederationDataError::NotFound {
                what: format!("sequence entity for target {target}"),
            })?;

        let mut properties = match entity.properties.clone() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let empty = sequence::pop_and_pack(&mut properties);
        let updated = self
            .client
            .update(&table, &partition, &row, Value::Object(properties), entity.etag)
            .await?;
        Ok((updated, empty))
    }

    /// Appends `unique_id` to the target's sequence, growing past 975
    /// entries into additional `Sequence<N>` properties as needed, and bumps
    /// `UniqueIds`/`AdditionTimestamps` with bounded-append truncation
    /// (§4.3). Creates the entity if it does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn push_sequence_id_for_job(
        &self,
        fedhash: &str,
        target: &str,
        unique_id: Uuid,
        added_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Entity> {
        let table = self.namespace().fedjobs_table();
        let partition = actions_partition(fedhash);
        let row = target_hash(target);

        let existing = self.client.get_entity(&table, &partition, &row).await?;
        let mut properties = match existing.as_ref().map(|e| e.properties.clone()) {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        let mut ids = sequence::unpack_sequence(&properties);
        ids.push(unique_id.to_string());
        sequence::pack_sequence(&mut properties, &ids);

        let unique_ids_key = properties
            .get("UniqueIds")
            .and_then(Value::as_str)
            .map(str::to_string);
        properties.insert(
            "UniqueIds".to_string(),
            Value::String(sequence::append_bounded(unique_ids_key.as_deref(), &unique_id.to_string())),
        );
        let timestamps_key = properties
            .get("AdditionTimestamps")
            .and_then(Value::as_str)
            .map(str::to_string);
        properties.insert(
            "AdditionTimestamps".to_string(),
            Value::String(sequence::append_bounded(timestamps_key.as_deref(), &added_at.to_rfc3339())),
        );

        match existing {
            Some(entity) => Ok(self
                .client
                .update(&table, &partition, &row, Value::Object(properties), entity.etag)
                .await?),
            None => Ok(self.client.insert(&table, &partition, &row, Value::Object(properties)).await?),
        }
    }

    /// Deletes the sequence entity for `target`, enforcing if-match against
    /// `expected_etag`. Called once a sequence has been popped empty and no
    /// job-location row remains for the target (§4.3).
    ///
    /// # Errors
    ///
    /// Returns `FederationDataError::Storage(StorageError::Conflict)` on a
    /// stale etag.
    pub async fn delete_sequence_entity_for_job(&self, fedhash: &str, target: &str, expected_etag: Uuid) -> Result<()> {
        let table = self.namespace().fedjobs_table();
        let partition = actions_partition(fedhash);
        let row = target_hash(target);
        Ok(self.client.delete(&table, &partition, &row, Some(expected_etag)).await?)
    }

    // ---- Job location -------------------------------------------------------

    /// Whether any location entity exists for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn location_entities_exist_for_job(&self, fedhash: &str, target: &str) -> Result<bool> {
        Ok(!self.get_all_location_entities_for_job(fedhash, target).await?.is_empty())
    }

    /// Every pool a target has been scheduled onto.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn get_all_location_entities_for_job(&self, fedhash: &str, target: &str) -> Result<Vec<Entity>> {
        let table = self.namespace().fedjobs_table();
        let partition = job_location_partition(fedhash, target);
        Ok(self.client.query_entities(&table, &partition).await?)
    }

    /// Insert-or-update a job-location entity, enforcing if-match semantics
    /// when `expected_etag` is set.
    ///
    /// # Errors
    ///
    /// Returns `FederationDataError::Storage(StorageError::Conflict)` on a
    /// stale etag.
    pub async fn insert_or_update_entity_with_etag_for_job(
        &self,
        fedhash: &str,
        target: &str,
        service_url: &str,
        pool_id: &str,
        properties: Value,
        expected_etag: Option<Uuid>,
    ) -> Result<Entity> {
        let table = self.namespace().fedjobs_table();
        let partition = job_location_partition(fedhash, target);
        let row = job_location_row_key(service_url, pool_id);
        match expected_etag {
            Some(etag) => Ok(self.client.update(&table, &partition, &row, properties, etag).await?),
            None => Ok(self.client.merge(&table, &partition, &row, properties).await?),
        }
    }

    /// Delete a job-location entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn delete_location_entity_for_job(
        &self,
        fedhash: &str,
        target: &str,
        service_url: &str,
        pool_id: &str,
    ) -> Result<()> {
        let table = self.namespace().fedjobs_table();
        let partition = job_location_partition(fedhash, target);
        let row = job_location_row_key(service_url, pool_id);
        Ok(self.client.delete(&table, &partition, &row, None).await?)
    }

    // ---- Blocked actions ----------------------------------------------------

    /// Record that `target` is blocked pending `action_uuid`'s deferral.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn add_blocked_action_for_job(
        &self,
        fedhash: &str,
        target: &str,
        action_uuid: Uuid,
        properties: Value,
    ) -> Result<Entity> {
        let table = self.namespace().fedjobs_table();
        let partition = blocked_partition(fedhash);
        let row = format!("{}${action_uuid}", target_hash(target));
        Ok(self.client.merge(&table, &partition, &row, properties).await?)
    }

    /// Clear a previously-recorded blocked action.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn remove_blocked_action_for_job(&self, fedhash: &str, target: &str, action_uuid: Uuid) -> Result<()> {
        let table = self.namespace().fedjobs_table();
        let partition = blocked_partition(fedhash);
        let row = format!("{}${action_uuid}", target_hash(target));
        Ok(self.client.delete(&table, &partition, &row, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_helpers_are_stable_and_disjoint() {
        let fedhash = "abc";
        assert_eq!(pools_partition(fedhash), "pools$abc");
        assert_eq!(actions_partition(fedhash), "actions$abc");
        assert_eq!(blocked_partition(fedhash), "blocked$abc");
        assert_ne!(pools_partition(fedhash), actions_partition(fedhash));
    }
}
