//! Per-pool TTL'd cache (§4.4.1).

use std::time::Duration;

use cf_core::{NodeStateCounts, PoolIdentity, PoolSnapshot};
use chrono::{DateTime, Utc};

/// Metadata marker recorded by the batch service when a pool was created for
/// native-container task execution (§4.4.1).
pub const NATIVE_CONTAINER_METADATA_NAME: &str = "BATCH_SHIPYARD_NATIVE_CONTAINER_POOL";

const POOL_SNAPSHOT_TTL: Duration = Duration::from_secs(60);
const NODE_COUNTS_TTL: Duration = Duration::from_secs(10);
const ACTIVE_TASKS_TTL: Duration = Duration::from_secs(20);

/// Default scheduling blackout applied after a successful submission (§4.4.1).
pub const DEFAULT_BLACKOUT_SECS: i64 = 15;

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    refreshed_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.refreshed_at);
        age > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
    }
}

/// One pool's cached state within a [`crate::Federation`] (§4.4.1).
#[derive(Debug, Clone)]
pub struct FederationPool {
    /// Stable identity.
    pub identity: PoolIdentity,
    snapshot: Option<Cached<PoolSnapshot>>,
    node_counts: Option<Cached<(NodeStateCounts, NodeStateCounts)>>,
    active_tasks: Option<Cached<u32>>,
    blackout_until: Option<DateTime<Utc>>,
    /// Pools that failed a pool-intrinsic hard-filter check are blacklisted
    /// for the remainder of the current action (§4.4.3).
    blacklisted: bool,
}

impl FederationPool {
    /// Construct an empty cache entry for `identity`.
    #[must_use]
    pub const fn new(identity: PoolIdentity) -> Self {
        Self {
            identity,
            snapshot: None,
            node_counts: None,
            active_tasks: None,
            blackout_until: None,
            blacklisted: false,
        }
    }

    /// The currently cached snapshot, regardless of staleness.
    #[must_use]
    pub fn snapshot(&self) -> Option<&PoolSnapshot> {
        self.snapshot.as_ref().map(|cached| &cached.value)
    }

    /// Whether the pool snapshot must be refetched.
    #[must_use]
    pub fn snapshot_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.snapshot.as_ref().is_none_or(|cached| cached.is_stale(now, POOL_SNAPSHOT_TTL))
    }

    /// Record a freshly fetched snapshot.
    pub fn set_snapshot(&mut self, snapshot: PoolSnapshot, now: DateTime<Utc>) {
        self.snapshot = Some(Cached {
            value: snapshot,
            refreshed_at: now,
        });
    }

    /// Whether the node-state counts must be refetched.
    #[must_use]
    pub fn node_counts_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.node_counts.as_ref().is_none_or(|cached| cached.is_stale(now, NODE_COUNTS_TTL))
    }

    /// Cached node-state counts, if any.
    #[must_use]
    pub fn node_counts(&self) -> Option<&(NodeStateCounts, NodeStateCounts)> {
        self.node_counts.as_ref().map(|cached| &cached.value)
    }

    /// Record freshly fetched node counts.
    pub fn set_node_counts(&mut self, counts: (NodeStateCounts, NodeStateCounts), now: DateTime<Utc>) {
        self.node_counts = Some(Cached {
            value: counts,
            refreshed_at: now,
        });
    }

    /// Whether the active-task count must be refetched.
    #[must_use]
    pub fn active_tasks_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.active_tasks.as_ref().is_none_or(|cached| cached.is_stale(now, ACTIVE_TASKS_TTL))
    }

    /// Cached active-task count, if any.
    #[must_use]
    pub fn active_tasks(&self) -> Option<u32> {
        self.active_tasks.as_ref().map(|cached| cached.value)
    }

    /// Record a freshly fetched active-task count.
    pub fn set_active_tasks(&mut self, count: u32, now: DateTime<Utc>) {
        self.active_tasks = Some(Cached {
            value: count,
            refreshed_at: now,
        });
    }

    /// Hard-invalidate every cached item, forcing a refresh on next use.
    /// Called immediately after a successful task schedule (§4.4.1).
    pub fn invalidate_all(&mut self) {
        self.snapshot = None;
        self.node_counts = None;
        self.active_tasks = None;
    }

    /// Enter a scheduling blackout of `seconds` from `now` (§4.4.1).
    pub fn begin_blackout(&mut self, now: DateTime<Utc>, seconds: i64) {
        self.blackout_until = Some(now + chrono::Duration::seconds(seconds));
    }

    /// Whether the pool is currently in its post-submission blackout.
    #[must_use]
    pub fn in_blackout(&self, now: DateTime<Utc>) -> bool {
        self.blackout_until.is_some_and(|until| now < until)
    }

    /// Whether this pool was blacklisted for the current action (§4.4.3).
    #[must_use]
    pub const fn is_blacklisted(&self) -> bool {
        self.blacklisted
    }

    /// Blacklist this pool for the remainder of the current action.
    pub fn blacklist(&mut self) {
        self.blacklisted = true;
    }

    /// Clear the blacklist flag; called at the start of each new action.
    pub fn clear_blacklist(&mut self) {
        self.blacklisted = false;
    }

    /// True when the pool's metadata declares it native-container enabled
    /// (§4.4.1).
    #[must_use]
    pub fn is_native_container(&self) -> bool {
        self.snapshot().is_some_and(|snapshot| snapshot.native_container_pool)
    }

    /// A pool is valid for matching when it has a fresh-enough snapshot
    /// and it is not presently blackout-suppressed or blacklisted (§3).
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_blacklisted()
            && !self.in_blackout(now)
            && self.snapshot().is_some_and(|snapshot| snapshot.is_valid(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> PoolIdentity {
        PoolIdentity {
            batch_account: "acct".into(),
            service_url: "https://acct.eastus.batch.azure.com".into(),
            location: "eastus".into(),
            pool_id: "pool-1".into(),
        }
    }

    #[test]
    fn fresh_pool_has_no_cached_snapshot_and_is_stale() {
        let pool = FederationPool::new(identity());
        assert!(pool.snapshot_is_stale(Utc::now()));
        assert!(pool.node_counts_is_stale(Utc::now()));
        assert!(pool.active_tasks_is_stale(Utc::now()));
    }

    #[test]
    fn blackout_suppresses_validity_until_it_expires() {
        let mut pool = FederationPool::new(identity());
        let now = Utc::now();
        pool.begin_blackout(now, DEFAULT_BLACKOUT_SECS);
        assert!(pool.in_blackout(now));
        assert!(!pool.in_blackout(now + chrono::Duration::seconds(DEFAULT_BLACKOUT_SECS + 1)));
    }

    #[test]
    fn invalidate_all_clears_every_cached_item() {
        let mut pool = FederationPool::new(identity());
        let now = Utc::now();
        pool.set_active_tasks(3, now);
        pool.invalidate_all();
        assert!(pool.active_tasks_is_stale(now));
    }

    #[test]
    fn blacklist_round_trips() {
        let mut pool = FederationPool::new(identity());
        assert!(!pool.is_blacklisted());
        pool.blacklist();
        assert!(pool.is_blacklisted());
        pool.clear_blacklist();
        assert!(!pool.is_blacklisted());
    }
}
