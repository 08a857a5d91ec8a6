//! `ActionProcessor` (§4.5): the per-federation FIFO loop that dequeues
//! action messages, reconciles them against the target's sequence head,
//! dispatches add/terminate/delete, and advances the sequence on success.

use std::collections::BTreeMap;
use std::sync::Arc;

use cf_core::{ActionKind, ActionMessage, ActionMethod, ActionPayload, PoolIdentity, TaskSpec, TriState};
use cf_federation::{Federation, fixup_ib_mismatch, ib_mismatch, patch_pool_id, renumber_if_dependency_free, rewrite_merge_dependencies};
use cf_federation_data::{FederationData, FederationDataError, GlobalLease};
use cf_storage::StorageError;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ActionError, Result};
use crate::location::LocationProperties;

/// Messages fetched per polling pass (§4.5 step 2).
pub const MAX_MESSAGES_PER_BATCH: usize = 32;
/// Visibility timeout applied to every fetched message, in seconds.
pub const VISIBILITY_TIMEOUT_SECS: i64 = 1;

/// Drives one federation's action queue to completion, one FIFO pass at a
/// time (§4.5).
pub struct ActionProcessor {
    federation: Arc<Federation>,
    data: FederationData,
    batch: cf_batch::BatchClient,
    events: cf_events::EventBus,
    lease: GlobalLease,
    fedhash: String,
    queue: String,
    payloads_container: String,
    busy: Mutex<()>,
}

impl ActionProcessor {
    /// Construct a processor for `federation`, deriving its queue and
    /// payload-container names from the shared namespace.
    #[must_use]
    pub fn new(
        federation: Arc<Federation>,
        data: FederationData,
        batch: cf_batch::BatchClient,
        events: cf_events::EventBus,
        lease: GlobalLease,
    ) -> Self {
        let fedhash = federation.hash.clone();
        let namespace = data.client().namespace().clone();
        let queue = namespace.fed_queue(&fedhash);
        let payloads_container = namespace.fed_payloads_container(&fedhash);
        Self {
            federation,
            data,
            batch,
            events,
            lease,
            fedhash,
            queue,
            payloads_container,
            busy: Mutex::new(()),
        }
    }

    /// Runs one pass of the loop: a non-blocking per-federation lock attempt,
    /// up to [`MAX_MESSAGES_PER_BATCH`] messages fetched, each dispatched in
    /// turn. Returns the number of messages successfully processed and
    /// removed from the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching the batch itself fails; per-message
    /// failures are logged and skipped so one bad message cannot wedge the
    /// whole batch.
    pub async fn run_once(&self) -> Result<usize> {
        let Ok(_guard) = self.busy.try_lock() else {
            return Ok(0);
        };

        let messages = self
            .data
            .client()
            .get_messages(&self.queue, MAX_MESSAGES_PER_BATCH, VISIBILITY_TIMEOUT_SECS)
            .await?;

        let mut processed = 0;
        for message in messages {
            if !self.lease.has_global_lock() {
                warn!(federation_id = %self.federation.id, "global lease lost mid-batch, aborting");
                break;
            }
            match self.process_message(&message).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(error) => warn!(federation_id = %self.federation.id, message_id = message.id, %error, "failed to process action message"),
            }
        }
        Ok(processed)
    }

    /// Processes one queue message. Returns `true` if the action was fully
    /// applied and the message removed; `false` if it was discarded (wrong
    /// federation) or left queued for deferred retry (no candidate pool).
    async fn process_message(&self, message: &cf_storage::QueueMessage) -> Result<bool> {
        let action: ActionMessage =
            serde_json::from_str(&message.body).map_err(|_| ActionError::Malformed { what: "action message".to_string() })?;

        if cf_core::hashing::federation_hash(&action.federation_id) != self.fedhash {
            warn!(federation_id = %action.federation_id, expected = %self.federation.id, "discarding action message addressed to a different federation");
            self.data.client().delete_message(&self.queue, message.id, message.receipt).await?;
            return Ok(false);
        }

        let _ = self.events.publish(cf_events::Event::ActionDequeued {
            federation_id: self.federation.id.clone(),
            target: action.target.clone(),
            uuid: action.uuid,
        });

        let head = self.data.get_first_sequence_id_for_job(&self.fedhash, &action.target).await?;
        let blob_uuid = match head {
            Some(head_uuid) if head_uuid != action.uuid => head_uuid,
            _ => action.uuid,
        };

        let payload = self.download_payload(blob_uuid).await?;
        let now = Utc::now();

        let matched = match payload.action.method {
            ActionMethod::Add => self.dispatch_add(payload.action.kind, blob_uuid, &action.target, payload, now).await?,
            ActionMethod::Terminate => {
                self.dispatch_terminate_or_delete(payload.action.kind, &action.target, true).await?;
                true
            }
            ActionMethod::Delete => {
                self.dispatch_terminate_or_delete(payload.action.kind, &action.target, false).await?;
                true
            }
        };

        if !matched {
            return Ok(false);
        }

        self.advance_sequence(&action.target).await?;
        self.data.client().delete_message(&self.queue, message.id, message.receipt).await?;
        Ok(true)
    }

    /// Downloads and deserializes the payload blob named `<uuid>.json` out
    /// of this federation's payload container (§4.5 step 6).
    async fn download_payload(&self, uuid: Uuid) -> Result<ActionPayload> {
        let name = format!("{uuid}.json");
        let bytes = self
            .data
            .client()
            .download_blob_to_bytes(&self.payloads_container, &name)
            .await?
            .ok_or_else(|| ActionError::Malformed { what: format!("payload blob {name} missing") })?;
        serde_json::from_slice(&bytes).map_err(|_| ActionError::Malformed { what: format!("action payload {name}") })
    }

    /// Matches, patches, and submits an `add` action. Returns `false`
    /// (leaving the message queued for deferred retry) when no candidate
    /// pool can be found.
    async fn dispatch_add(
        &self,
        kind: ActionKind,
        action_uuid: Uuid,
        target: &str,
        mut payload: ActionPayload,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let constraints = payload.target.constraints.clone();
        let required = if constraints.task.has_multi_instance {
            constraints.task.instance_counts_max.unwrap_or(1).max(1)
        } else {
            constraints
                .task
                .instance_counts_total
                .unwrap_or_else(|| u32::try_from(payload.task_map.len()).unwrap_or(u32::MAX))
                .max(1)
        };
        let slot_based_only = !constraints.task.has_multi_instance;

        let placement = match self.federation.find_target_pool(target, &constraints, required, slot_based_only).await {
            Ok(placement) => placement,
            Err(error) => {
                let reason = error.to_string();
                self.data
                    .add_blocked_action_for_job(
                        &self.fedhash,
                        target,
                        action_uuid,
                        json!({ "reason": reason, "task_count": payload.task_map.len() }),
                    )
                    .await?;
                let _ = self.events.publish(cf_events::Event::ActionBlocked {
                    federation_id: self.federation.id.clone(),
                    target: target.to_string(),
                    reason,
                });
                return Ok(false);
            }
        };

        let identity: PoolIdentity = self
            .federation
            .pool_identity(&placement.pool_id)
            .await
            .ok_or_else(|| ActionError::Malformed {
                what: format!("pool {} vanished from cache after match", placement.pool_id),
            })?;
        let snapshot = self.federation.pool_snapshot(&placement.pool_id).await.ok_or_else(|| ActionError::Malformed {
            what: format!("pool {} has no cached snapshot", placement.pool_id),
        })?;
        let family = cf_federation::NodeAgentFamily::classify(&snapshot.node_agent_sku);
        let pool_vm_size = snapshot.vm_props.as_ref().map_or("", |vm| vm.vm_size.as_str());

        patch_pool_id(&mut payload.target.data, &identity.pool_id);

        let mut tasks: BTreeMap<String, TaskSpec> = std::mem::take(&mut payload.task_map).into_iter().collect();
        let naming = payload.target.task_naming.as_ref();
        let should_renumber = naming.is_some() && !constraints.task.has_task_dependencies;
        let old_ids: Vec<String> = if should_renumber { tasks.keys().cloned().collect() } else { Vec::new() };
        renumber_if_dependency_free(naming, constraints.task.has_task_dependencies, &[], &mut tasks);
        if should_renumber {
            let new_ids: Vec<String> = tasks.keys().cloned().collect();
            let old_to_new: BTreeMap<String, String> = old_ids.into_iter().zip(new_ids).collect();
            if let Some(merge_id) = constraints.task.merge_task_id.as_ref() {
                let merge_key = old_to_new.get(merge_id).cloned().unwrap_or_else(|| merge_id.clone());
                if let Some(merge_task) = tasks.get_mut(&merge_key) {
                    rewrite_merge_dependencies(&old_to_new, merge_task);
                }
            }
        }

        let task_expects_ib = constraints.node.infiniband == TriState::Require;
        for task in tasks.values_mut() {
            if ib_mismatch(task_expects_ib, pool_vm_size, snapshot.native_container_pool) {
                let mut coordination = task.coordination_command_line.take();
                fixup_ib_mismatch(&mut task.command_line, coordination.as_mut(), family);
                task.coordination_command_line = coordination;
            }
        }

        match kind {
            ActionKind::Job => self.batch.add_job(&identity.service_url, target, &payload.target.data).await?,
            ActionKind::JobSchedule => self.batch.add_job_schedule(&identity.service_url, target, &payload.target.data).await?,
        }
        if !tasks.is_empty() {
            self.batch.add_task_collection(&identity.service_url, target, &tasks).await?;
        }

        self.record_location(&identity, kind, target, &action_uuid.to_string(), now).await?;
        // Best-effort cleanup; a future blocked-action retry sweep (§4.8) is
        // the authoritative place to emit `ActionUnblocked`.
        let _ = self.data.remove_blocked_action_for_job(&self.fedhash, target, action_uuid).await;
        let _ = self.events.publish(cf_events::Event::ActionMatched {
            federation_id: self.federation.id.clone(),
            target: target.to_string(),
            pool_id: identity.pool_id.clone(),
        });
        self.federation.evaluate_autoscale_if_enabled(&placement.pool_id).await;
        Ok(true)
    }

    /// Records (or extends) the job-location row for a successful
    /// submission, merging into an already-existing row for the same
    /// `(service_url, pool_id)` pair rather than overwriting it.
    async fn record_location(&self, identity: &PoolIdentity, kind: ActionKind, target: &str, unique_id: &str, now: DateTime<Utc>) -> Result<()> {
        let row_key = cf_core::hashing::job_location_row_key(&identity.service_url, &identity.pool_id);
        let existing = self
            .data
            .get_all_location_entities_for_job(&self.fedhash, target)
            .await?
            .into_iter()
            .find(|entity| entity.row_key == row_key);

        let (properties, expected_etag) = match existing {
            Some(entity) => {
                let mut location: LocationProperties = serde_json::from_value(entity.properties.clone())
                    .map_err(|_| ActionError::Malformed { what: format!("location entity for {target}") })?;
                location.record_submission(unique_id, now);
                (serde_json::to_value(&location).unwrap_or_default(), Some(entity.etag))
            }
            None => {
                let location = LocationProperties::new(
                    identity.batch_account.clone(),
                    identity.service_url.clone(),
                    identity.pool_id.clone(),
                    kind,
                    unique_id,
                    now,
                );
                (serde_json::to_value(&location).unwrap_or_default(), None)
            }
        };

        self.data
            .insert_or_update_entity_with_etag_for_job(&self.fedhash, target, &identity.service_url, &identity.pool_id, properties, expected_etag)
            .await?;
        Ok(())
    }

    /// Looks up every pool a target has been placed on and terminates or
    /// deletes it there, in parallel (§4.5 step 7). Terminate stamps
    /// `terminate_timestamp` idempotently; delete waits for the service's
    /// acknowledgement before removing the location row.
    async fn dispatch_terminate_or_delete(&self, kind: ActionKind, target: &str, terminate: bool) -> Result<()> {
        let batch_kind = match kind {
            ActionKind::Job => cf_batch::TargetKind::Job,
            ActionKind::JobSchedule => cf_batch::TargetKind::JobSchedule,
        };

        let jobs: Vec<(cf_storage::Entity, LocationProperties)> = self
            .data
            .get_all_location_entities_for_job(&self.fedhash, target)
            .await?
            .into_iter()
            .filter_map(|entity| {
                let location: LocationProperties = serde_json::from_value(entity.properties.clone()).ok()?;
                Some((entity, location))
            })
            .collect();

        let outcomes = futures_util::future::join_all(jobs.into_iter().map(|(entity, location)| {
            let batch = self.batch.clone();
            async move {
                let result = if terminate {
                    batch.terminate(&location.service_url, batch_kind, target).await
                } else {
                    batch.delete(&location.service_url, batch_kind, target).await
                };
                (entity, location, result)
            }
        }))
        .await;

        for (entity, mut location, result) in outcomes {
            match result {
                Ok(()) if terminate => {
                    if location.terminate_timestamp.is_none() {
                        location.terminate_timestamp = Some(Utc::now());
                        let properties = serde_json::to_value(&location).unwrap_or_default();
                        self.data
                            .insert_or_update_entity_with_etag_for_job(&self.fedhash, target, &location.service_url, &location.pool_id, properties, Some(entity.etag))
                            .await?;
                    }
                }
                Ok(()) => {
                    self.data
                        .delete_location_entity_for_job(&self.fedhash, target, &location.service_url, &location.pool_id)
                        .await?;
                }
                Err(error) => warn!(target, pool_id = %location.pool_id, %error, "terminate/delete failed for one location"),
            }
        }

        let event = if terminate {
            cf_events::Event::TargetTerminated { federation_id: self.federation.id.clone(), target: target.to_string() }
        } else {
            cf_events::Event::TargetDeleted { federation_id: self.federation.id.clone(), target: target.to_string() }
        };
        let _ = self.events.publish(event);
        Ok(())
    }

    /// Pops the sequence head; if it emptied and no location row remains for
    /// the target, deletes the sequence entity outright. Retries once on a
    /// concurrent-writer conflict (§4.3, §4.5 step 8).
    async fn advance_sequence(&self, target: &str) -> Result<()> {
        loop {
            match self.data.pop_and_pack_sequence_ids_for_job(&self.fedhash, target).await {
                Ok((entity, empty)) => {
                    if empty && !self.data.location_entities_exist_for_job(&self.fedhash, target).await? {
                        if let Err(error) = self.data.delete_sequence_entity_for_job(&self.fedhash, target, entity.etag).await {
                            warn!(target, %error, "failed to delete drained sequence entity");
                        }
                    }
                    return Ok(());
                }
                Err(FederationDataError::Storage(StorageError::Conflict { .. })) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}
