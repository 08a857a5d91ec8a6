//! Federation (C4): in-memory cache of one federation's pools, orchestrating
//! the cache refresh, hard/node filters, and greedy best-fit match.

use std::collections::HashMap;
use std::sync::Arc;

use cf_batch::BatchClient;
use cf_core::{PoolIdentity, TargetConstraints};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{DEFAULT_BLACKOUT_SECS, FederationPool};
use crate::error::{FederationError, Result};
use crate::filter::{hard_filter, node_filter};
use crate::matcher::{Placement, candidates, select};

/// In-memory cache of one federation's pools (§3, §4.4.1).
pub struct Federation {
    /// Federation id as configured.
    pub id: String,
    /// `SHA1(id)`.
    pub hash: String,
    batch: BatchClient,
    pools: RwLock<HashMap<String, FederationPool>>,
    blackout_interval: i64,
}

impl Federation {
    /// Construct an empty federation cache.
    #[must_use]
    pub fn new(id: String, batch: BatchClient, blackout_interval: i64) -> Arc<Self> {
        let hash = cf_core::hashing::federation_hash(&id);
        Arc::new(Self {
            id,
            hash,
            batch,
            pools: RwLock::new(HashMap::new()),
            blackout_interval,
        })
    }

    /// Register (or replace) a pool's identity in the cache.
    pub async fn register_pool(&self, poolhash: String, identity: PoolIdentity) {
        let mut pools = self.pools.write().await;
        pools.entry(poolhash).or_insert_with(|| FederationPool::new(identity));
    }

    /// Remove a pool from the cache (it was removed from the federation).
    pub async fn deregister_pool(&self, poolhash: &str) {
        self.pools.write().await.remove(poolhash);
    }

    /// Refreshes any stale cached item for every registered pool, in bounded
    /// concurrency, via `BatchClient` (§4.4.1, §4.8).
    pub async fn refresh_stale(&self) {
        let now = Utc::now();
        let snapshot_targets: Vec<(String, PoolIdentity)> = {
            let pools = self.pools.read().await;
            pools
                .iter()
                .filter(|(_, pool)| pool.snapshot_is_stale(now) || pool.node_counts_is_stale(now) || pool.active_tasks_is_stale(now))
                .map(|(hash, pool)| (hash.clone(), pool.identity.clone()))
                .collect()
        };

        for (poolhash, identity) in snapshot_targets {
            match self.batch.get_pool(&identity.service_url, &identity.pool_id).await {
                Ok(Some(snapshot)) => {
                    let counts = self
                        .batch
                        .get_node_state_counts(&identity.service_url, &identity.pool_id)
                        .await
                        .ok();
                    let active = self
                        .batch
                        .aggregate_active_tasks_on_pool(&identity.service_url, &identity.pool_id)
                        .await
                        .ok();
                    let mut pools = self.pools.write().await;
                    if let Some(pool) = pools.get_mut(&poolhash) {
                        pool.set_snapshot(snapshot, now);
                        if let Some(counts) = counts {
                            pool.set_node_counts(counts, now);
                        }
                        if let Some(active) = active {
                            pool.set_active_tasks(active, now);
                        }
                    }
                }
                Ok(None) => warn!(pool_id = %identity.pool_id, "pool no longer exists on the batch service"),
                Err(error) => warn!(pool_id = %identity.pool_id, %error, "failed to refresh pool snapshot"),
            }
        }
    }

    /// Finds the best-fit pool for `required` units of capacity under
    /// `constraints`, applying the hard filter, node filter, and greedy
    /// best-fit policy in order (§4.4.3-§4.4.5).
    ///
    /// # Errors
    ///
    /// Returns `FederationError::NoCandidatePool` when no pool satisfies the
    /// constraints or has sufficient capacity under every fallback step.
    pub async fn find_target_pool(
        &self,
        target: &str,
        constraints: &TargetConstraints,
        required: u32,
        slot_based_only: bool,
    ) -> Result<Placement> {
        let now = Utc::now();
        let mut pools = self.pools.write().await;
        for pool in pools.values_mut() {
            pool.clear_blacklist();
        }

        let mut surviving = Vec::new();
        for (poolhash, pool) in pools.iter_mut() {
            if pool.in_blackout(now) {
                continue;
            }
            let Some(snapshot) = pool.snapshot().cloned() else {
                continue;
            };
            if !snapshot.is_valid(now) {
                continue;
            }
            match hard_filter(&snapshot, pool, constraints) {
                Ok(()) => {}
                Err(failure) => {
                    debug!(pool_id = %pool.identity.pool_id, reason = failure.reason(), "pool failed hard filter");
                    if failure.is_intrinsic() {
                        pool.blacklist();
                    }
                    continue;
                }
            }
            if let Err(failure) = node_filter(&snapshot, constraints) {
                debug!(pool_id = %pool.identity.pool_id, reason = failure.reason(), "pool failed node filter");
                continue;
            }
            surviving.push((poolhash.clone(), snapshot));
        }

        if surviving.is_empty() {
            return Err(FederationError::NoCandidatePool {
                target: target.to_string(),
                reason: "no pool survived the hard or node filter".to_string(),
            });
        }

        let views: Vec<(&str, &cf_core::PoolSnapshot)> = surviving.iter().map(|(id, snap)| (id.as_str(), snap)).collect();
        let candidate_list = candidates(&views, constraints);
        let placement = select(candidate_list, required, slot_based_only).ok_or_else(|| FederationError::NoCandidatePool {
            target: target.to_string(),
            reason: "no surviving pool had sufficient capacity".to_string(),
        })?;

        if let Some(pool) = pools.get_mut(&placement.pool_id) {
            pool.begin_blackout(now, self.blackout_interval);
            pool.invalidate_all();
        }
        Ok(placement)
    }

    /// Re-evaluates autoscale on `poolhash` if it is autoscale-enabled
    /// (no-op otherwise, §4.2/§2).
    pub async fn evaluate_autoscale_if_enabled(&self, poolhash: &str) {
        let target = {
            let pools = self.pools.read().await;
            pools.get(poolhash).and_then(|pool| {
                pool.snapshot()
                    .filter(|snapshot| snapshot.autoscale_enabled)
                    .map(|snapshot| (snapshot.identity.service_url.clone(), snapshot.identity.pool_id.clone()))
            })
        };
        if let Some((service_url, pool_id)) = target {
            if let Err(error) = self.batch.immediately_evaluate_autoscale(&service_url, &pool_id).await {
                warn!(pool_id, %error, "failed to trigger immediate autoscale evaluation");
            }
        }
    }

    /// Look up a pool's identity by its poolhash, if cached.
    pub async fn pool_identity(&self, poolhash: &str) -> Option<PoolIdentity> {
        self.pools.read().await.get(poolhash).map(|pool| pool.identity.clone())
    }

    /// Look up a pool's cached snapshot by its poolhash, if present.
    pub async fn pool_snapshot(&self, poolhash: &str) -> Option<cf_core::PoolSnapshot> {
        self.pools.read().await.get(poolhash).and_then(|pool| pool.snapshot().cloned())
    }

    /// Every poolhash currently cached, for reconciling against the
    /// federation's source-of-truth pool list (§4.8).
    pub async fn known_pool_hashes(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_target_pool_errors_when_nothing_registered() {
        let federation = Federation::new("fed-a".into(), BatchClient::new(), DEFAULT_BLACKOUT_SECS);
        let err = federation
            .find_target_pool("job-1", &TargetConstraints::default(), 2, true)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::NoCandidatePool { .. }));
    }

    #[tokio::test]
    async fn register_and_deregister_pool_round_trips() {
        let federation = Federation::new("fed-a".into(), BatchClient::new(), DEFAULT_BLACKOUT_SECS);
        let identity = PoolIdentity {
            batch_account: "acct".into(),
            service_url: "https://acct.eastus.batch.azure.com".into(),
            location: "eastus".into(),
            pool_id: "pool-1".into(),
        };
        federation.register_pool("poolhash".into(), identity).await;
        assert!(federation.pool_identity("poolhash").await.is_some());
        federation.deregister_pool("poolhash").await;
        assert!(federation.pool_identity("poolhash").await.is_none());
    }
}
