//! Pool identity and cached snapshot shapes (§3 "FederationPool", §4.4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of one pool within a federation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PoolIdentity {
    /// Cloud batch account that owns the pool.
    pub batch_account: String,
    /// Batch service URL for `batch_account`.
    pub service_url: String,
    /// Region/location of the pool.
    pub location: String,
    /// Pool identifier within `batch_account`.
    pub pool_id: String,
}

/// Lifecycle state of the pool as reported by the batch service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Pool is active and can schedule work.
    Active,
    /// Pool is being deleted.
    Deleting,
    /// Pool is upgrading its OS image.
    Upgrading,
}

/// VM-size properties relevant to constraint matching (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmProperties {
    /// Exact VM size string (e.g. `STANDARD_D2S_V3`).
    pub vm_size: String,
    /// Core count of the VM size.
    pub cores: f64,
    /// Memory in MB.
    pub memory_mb: f64,
    /// True when the VM size is in the GPU-capable prefix set.
    pub gpu_capable: bool,
    /// True when the VM size is in the InfiniBand-capable suffix set.
    pub infiniband_capable: bool,
}

/// Node-state counts for one node flavour (dedicated or low-priority), §4.2.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct NodeStateCounts {
    /// Nodes sitting idle.
    pub idle: u32,
    /// Nodes currently running tasks.
    pub running: u32,
    /// Nodes still starting up.
    pub starting: u32,
    /// Nodes in an unusable state (offline, unusable, start-task-failed, ...).
    pub unusable: u32,
}

impl NodeStateCounts {
    /// Slots considered "schedulable" right now: `idle + running` (§4.4.1).
    #[must_use]
    pub const fn schedulable(&self) -> u32 {
        self.idle + self.running
    }
}

/// Cached, TTL'd snapshot of one pool (§3, §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Stable identity.
    pub identity: PoolIdentity,
    /// Lifecycle state reported by the batch service.
    pub state: PoolState,
    /// VM-size properties, when known.
    pub vm_props: Option<VmProperties>,
    /// Published node-agent SKU id (`batch.node.ubuntu 18.04-lts`, ...),
    /// used to classify the node-agent family for submission patching
    /// (§4.4.6).
    pub node_agent_sku: String,
    /// Dedicated node-state counts.
    pub dedicated: NodeStateCounts,
    /// Low-priority node-state counts.
    pub low_priority: NodeStateCounts,
    /// Active task count aggregated across jobs targeting this pool.
    pub active_tasks_count: u32,
    /// Maximum tasks schedulable per node.
    pub max_tasks_per_node: u32,
    /// Whether the pool is enrolled in a virtual network.
    pub virtual_network_arm_id: Option<String>,
    /// Custom-image ARM id, when the pool uses one.
    pub custom_image_arm_id: Option<String>,
    /// Whether the pool is flagged `NATIVE_CONTAINER_POOL=1` (§4.4.1).
    pub native_container_pool: bool,
    /// Whether autoscale is enabled on this pool.
    pub autoscale_enabled: bool,
    /// `"<server>-<username>"` registry login keys configured on this pool (§4.4.3).
    #[serde(default)]
    pub registry_login_keys: Vec<String>,
    /// Scheduling blackout expiry; the pool is invalid for matching until this time passes.
    pub blackout_until: Option<DateTime<Utc>>,
}

impl PoolSnapshot {
    /// A pool is *valid* per §3: snapshot present, VM-size known, blackout expired,
    /// and the underlying batch service reports it `Active`.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.vm_props.is_some()
            && self.state == PoolState::Active
            && self.blackout_until.is_none_or(|until| now >= until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(blackout_until: Option<DateTime<Utc>>) -> PoolSnapshot {
        PoolSnapshot {
            identity: PoolIdentity {
                batch_account: "acct".into(),
                service_url: "https://acct.region.batch.azure.com".into(),
                location: "eastus".into(),
                pool_id: "pool-1".into(),
            },
            state: PoolState::Active,
            vm_props: Some(VmProperties {
                vm_size: "STANDARD_D2S_V3".into(),
                cores: 2.0,
                memory_mb: 8192.0,
                gpu_capable: false,
                infiniband_capable: false,
            }),
            node_agent_sku: "batch.node.ubuntu 18.04-lts".into(),
            dedicated: NodeStateCounts {
                idle: 2,
                ..NodeStateCounts::default()
            },
            low_priority: NodeStateCounts::default(),
            active_tasks_count: 0,
            max_tasks_per_node: 2,
            virtual_network_arm_id: None,
            custom_image_arm_id: None,
            native_container_pool: false,
            autoscale_enabled: false,
            registry_login_keys: Vec::new(),
            blackout_until,
        }
    }

    #[test]
    fn valid_pool_has_vm_props_and_is_active() {
        assert!(snapshot(None).is_valid(Utc::now()));
    }

    #[test]
    fn blackout_invalidates_pool_until_it_expires() {
        let now = Utc::now();
        let pool = snapshot(Some(now + chrono::Duration::seconds(15)));
        assert!(!pool.is_valid(now));
        assert!(pool.is_valid(now + chrono::Duration::seconds(16)));
    }

    #[test]
    fn schedulable_sums_idle_and_running() {
        let counts = NodeStateCounts {
            idle: 2,
            running: 3,
            starting: 1,
            unusable: 0,
        };
        assert_eq!(counts.schedulable(), 5);
    }
}
