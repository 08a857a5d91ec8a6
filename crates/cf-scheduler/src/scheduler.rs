//! `FederationScheduler` (§4.8): the periodic task driver that discovers
//! federations/pools, keeps the global lease renewed, polls every
//! federation's action queue, and refreshes stale pool properties, all as
//! cancellable background loops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cf_action::ActionProcessor;
use cf_batch::BatchClient;
use cf_core::PoolIdentity;
use cf_events::EventBus;
use cf_federation::Federation;
use cf_federation_data::{FederationData, GlobalLease};
use futures_util::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::FederationRecord;

/// Interval between full federation/pool registry reconciliation passes.
pub const FEDERATIONS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Interval between action-queue polling passes.
pub const ACTION_QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Interval between stale pool-property refresh passes.
pub const POOL_PROPERTY_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound on concurrently-polled federations, regardless of pool count.
pub const MAX_POOL_WORKERS: usize = 32;

/// Clamps the number of concurrent action-queue workers to
/// `[1, MAX_POOL_WORKERS]`.
const fn worker_cap(total_pools: usize) -> usize {
    if total_pools == 0 {
        1
    } else if total_pools > MAX_POOL_WORKERS {
        MAX_POOL_WORKERS
    } else {
        total_pools
    }
}

/// Drives every registered federation's background work (§4.8).
pub struct FederationScheduler {
    data: FederationData,
    batch: BatchClient,
    events: EventBus,
    lease: GlobalLease,
    blackout_interval: i64,
    federations: RwLock<HashMap<String, Arc<Federation>>>,
    processors: RwLock<HashMap<String, Arc<ActionProcessor>>>,
}

impl FederationScheduler {
    /// Construct a scheduler with an empty registry; call
    /// [`Self::refresh_registry`] once before [`Self::spawn`] to populate it.
    #[must_use]
    pub fn new(data: FederationData, batch: BatchClient, events: EventBus, lease: GlobalLease, blackout_interval: i64) -> Arc<Self> {
        Arc::new(Self {
            data,
            batch,
            events,
            lease,
            blackout_interval,
            federations: RwLock::new(HashMap::new()),
            processors: RwLock::new(HashMap::new()),
        })
    }

    /// Number of federations currently tracked.
    pub async fn federation_count(&self) -> usize {
        self.federations.read().await.len()
    }

    /// Look up a tracked federation by its hash.
    pub async fn federation(&self, fedhash: &str) -> Option<Arc<Federation>> {
        self.federations.read().await.get(fedhash).cloned()
    }

    /// Reconciles the in-memory registry against the configured federations
    /// and, per federation, its configured pools. Federations/pools no
    /// longer present in storage are dropped; new ones are discovered and
    /// given a fresh [`Federation`] cache and [`ActionProcessor`].
    ///
    /// # Errors
    ///
    /// Returns an error if the federation or pool partitions cannot be read.
    pub async fn refresh_registry(&self) -> Result<()> {
        let entities = self.data.get_all_federations().await?;
        let mut seen = HashSet::new();

        for entity in entities {
            let Ok(record) = serde_json::from_value::<FederationRecord>(entity.properties.clone()) else {
                warn!(row_key = %entity.row_key, "skipping malformed federation entity");
                continue;
            };
            let fedhash = cf_core::hashing::federation_hash(&record.id);
            seen.insert(fedhash.clone());

            let federation = self.federations.read().await.get(&fedhash).cloned();
            let federation = match federation {
                Some(federation) => federation,
                None => {
                    let federation = Federation::new(record.id.clone(), self.batch.clone(), self.blackout_interval);
                    self.federations.write().await.insert(fedhash.clone(), Arc::clone(&federation));
                    let processor = Arc::new(ActionProcessor::new(
                        Arc::clone(&federation),
                        self.data.clone(),
                        self.batch.clone(),
                        self.events.clone(),
                        self.lease.clone(),
                    ));
                    self.processors.write().await.insert(fedhash.clone(), processor);
                    info!(federation_id = %record.id, "discovered federation");
                    federation
                }
            };

            self.sync_pools(&federation, &fedhash).await?;
        }

        let stale: Vec<String> = {
            let federations = self.federations.read().await;
            federations.keys().filter(|hash| !seen.contains(*hash)).cloned().collect()
        };
        if !stale.is_empty() {
            let mut federations = self.federations.write().await;
            let mut processors = self.processors.write().await;
            for hash in stale {
                federations.remove(&hash);
                processors.remove(&hash);
                info!(fedhash = hash, "federation no longer configured, dropping");
            }
        }
        Ok(())
    }

    async fn sync_pools(&self, federation: &Arc<Federation>, fedhash: &str) -> Result<()> {
        let entities = self.data.get_all_pools_for_federation(fedhash).await?;
        let mut seen = HashSet::new();
        for entity in entities {
            match serde_json::from_value::<PoolIdentity>(entity.properties.clone()) {
                Ok(identity) => {
                    seen.insert(entity.row_key.clone());
                    federation.register_pool(entity.row_key, identity).await;
                }
                Err(error) => warn!(row_key = %entity.row_key, %error, "skipping malformed pool entity"),
            }
        }
        for poolhash in federation.known_pool_hashes().await {
            if !seen.contains(&poolhash) {
                federation.deregister_pool(&poolhash).await;
            }
        }
        Ok(())
    }

    /// Polls every tracked federation's action queue once, bounding
    /// concurrency to `min(total registered pools, MAX_POOL_WORKERS)`.
    pub async fn run_action_queues(&self) {
        let processors: Vec<Arc<ActionProcessor>> = self.processors.read().await.values().cloned().collect();
        let mut total_pools = 0;
        for federation in self.federations.read().await.values() {
            total_pools += federation.known_pool_hashes().await.len();
        }
        let cap = worker_cap(total_pools);

        stream::iter(processors)
            .for_each_concurrent(cap, |processor| async move {
                match processor.run_once().await {
                    Ok(0) => {}
                    Ok(processed) => debug!(processed, "action batch processed"),
                    Err(error) => warn!(%error, "action queue poll failed"),
                }
            })
            .await;
    }

    /// Spawns the four background loops (registry refresh, lease renewal,
    /// action-queue polling, pool-property refresh) and returns their
    /// handles. Every loop exits once `cancel` fires.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_registry_refresh(cancel.clone()),
            self.spawn_lease_renewal(cancel.clone()),
            self.spawn_action_queue_poll(cancel.clone()),
            self.spawn_pool_property_refresh(cancel),
        ]
    }

    fn spawn_registry_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FEDERATIONS_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("federation registry refresh loop cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = scheduler.refresh_registry().await {
                            warn!(%error, "failed to refresh federation registry");
                        }
                    }
                }
            }
        })
    }

    fn spawn_lease_renewal(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let lease = self.lease.clone();
        let data = self.data.clone();
        tokio::spawn(async move {
            lease.run(&data, cancel).await;
        })
    }

    fn spawn_action_queue_poll(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ACTION_QUEUE_POLL_INTERVAL);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("action queue poll loop cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        if scheduler.lease.has_global_lock() {
                            scheduler.run_action_queues().await;
                        }
                    }
                }
            }
        })
    }

    fn spawn_pool_property_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POOL_PROPERTY_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("pool property refresh loop cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        let federations: Vec<Arc<Federation>> = scheduler.federations.read().await.values().cloned().collect();
                        for federation in federations {
                            federation.refresh_stale().await;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_cap_clamps_to_range() {
        assert_eq!(worker_cap(0), 1);
        assert_eq!(worker_cap(5), 5);
        assert_eq!(worker_cap(MAX_POOL_WORKERS), MAX_POOL_WORKERS);
        assert_eq!(worker_cap(MAX_POOL_WORKERS + 10), MAX_POOL_WORKERS);
    }
}
