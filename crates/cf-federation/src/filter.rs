//! Hard filter (§4.4.3) and node filter (§4.4.4).

use cf_core::{PoolSnapshot, TargetConstraints};

use crate::cache::FederationPool;

/// VM-size prefixes considered GPU-capable, lowercased (grounded on
/// `convoy/settings.py`/`federation/federation.py`'s `_GPU_INSTANCE_PREFIXES`).
const GPU_PREFIXES: &[&str] = &["standard_nc", "standard_nd", "standard_nv"];

/// Exact VM sizes considered InfiniBand-capable, lowercased.
const RDMA_INSTANCES: &[&str] = &["standard_a8", "standard_a9"];

/// VM-size suffixes considered InfiniBand-capable, lowercased.
const RDMA_SUFFIXES: &[&str] = &["r", "rs", "rs_v2", "rs_v3"];

/// True when `vm_size` is GPU-capable per the documented prefix set.
#[must_use]
pub fn is_gpu_vm_size(vm_size: &str) -> bool {
    let lower = vm_size.to_lowercase();
    GPU_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// True when `vm_size` is InfiniBand/RDMA-capable per the documented set.
#[must_use]
pub fn is_rdma_vm_size(vm_size: &str) -> bool {
    let lower = vm_size.to_lowercase();
    RDMA_INSTANCES.contains(&lower.as_str()) || RDMA_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Derives the `"<server>-<username>"` registry login key, substituting
/// `dockerhub` for an empty server (§4.4.3).
#[must_use]
pub fn registry_login_key(server: &str, username: &str) -> String {
    let server = if server.is_empty() { "dockerhub" } else { server };
    format!("{server}-{username}")
}

/// Reason a pool failed a hard-filter check, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardFilterFailure {
    /// Pool-intrinsic failure: the pool is blacklisted for this action.
    Intrinsic(&'static str),
    /// Count/capacity failure: the pool may still become valid later.
    Transient(&'static str),
}

impl HardFilterFailure {
    /// The check name that failed, for logging (§4.4.3).
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Intrinsic(reason) | Self::Transient(reason) => reason,
        }
    }

    /// Whether this failure should blacklist the pool for the remainder of
    /// the action (every hard-filter failure is pool-intrinsic, §4.4.3).
    #[must_use]
    pub const fn is_intrinsic(self) -> bool {
        matches!(self, Self::Intrinsic(_))
    }
}

/// Applies the hard filter in the exact documented order (§4.4.3):
/// location → vnet → image → windows → native → autoscale allow/exclusive →
/// low-priority allow/exclusive → exclusive → vm_size → gpu → infiniband →
/// cores → memory → multi-instance → registries.
pub fn hard_filter(snapshot: &PoolSnapshot, pool: &FederationPool, constraints: &TargetConstraints) -> Result<(), HardFilterFailure> {
    let vm_props = snapshot.vm_props.as_ref();

    if let Some(location) = &constraints.pool.location {
        if &snapshot.identity.location != location {
            return Err(HardFilterFailure::Intrinsic("location"));
        }
    }
    if let Some(vnet) = &constraints.pool.virtual_network_arm_id {
        if snapshot.virtual_network_arm_id.as_deref() != Some(vnet.as_str()) {
            return Err(HardFilterFailure::Intrinsic("virtual_network_arm_id"));
        }
    }
    if let Some(image) = &constraints.pool.custom_image_arm_id {
        if snapshot.custom_image_arm_id.as_deref() != Some(image.as_str()) {
            return Err(HardFilterFailure::Intrinsic("custom_image_arm_id"));
        }
    }
    if let Some(windows) = constraints.pool.windows {
        let is_windows = vm_props.is_none_or(|vm| vm.vm_size.to_lowercase().contains("win"));
        if windows != is_windows {
            return Err(HardFilterFailure::Intrinsic("windows"));
        }
    }
    if let Some(native) = constraints.pool.native {
        if native != pool.is_native_container() {
            return Err(HardFilterFailure::Intrinsic("native"));
        }
    }
    if let Some(allow) = constraints.pool.autoscale_allow {
        if !allow && snapshot.autoscale_enabled {
            return Err(HardFilterFailure::Intrinsic("autoscale_allow"));
        }
    }
    if constraints.pool.autoscale_exclusive && !snapshot.autoscale_enabled {
        return Err(HardFilterFailure::Intrinsic("autoscale_exclusive"));
    }
    if let Some(allow) = constraints.pool.low_priority_nodes_allow {
        if !allow && pool.node_counts().is_some_and(|(_, lp)| lp.schedulable() > 0) {
            return Err(HardFilterFailure::Intrinsic("low_priority_nodes_allow"));
        }
    }
    if constraints.pool.low_priority_nodes_exclusive
        && pool.node_counts().is_some_and(|(dedicated, _)| dedicated.schedulable() > 0)
    {
        return Err(HardFilterFailure::Intrinsic("low_priority_nodes_exclusive"));
    }
    if constraints.node.exclusive && snapshot.max_tasks_per_node != 1 {
        return Err(HardFilterFailure::Intrinsic("exclusive"));
    }
    if let Some(vm_size) = &constraints.node.vm_size {
        if vm_props.is_none_or(|vm| &vm.vm_size != vm_size) {
            return Err(HardFilterFailure::Intrinsic("vm_size"));
        }
    }
    let gpu_capable = vm_props.is_some_and(|vm| vm.gpu_capable);
    if !constraints.node.gpu.is_satisfied_by(gpu_capable) {
        return Err(HardFilterFailure::Intrinsic("gpu"));
    }
    let ib_capable = vm_props.is_some_and(|vm| vm.infiniband_capable);
    if !constraints.node.infiniband.is_satisfied_by(ib_capable) {
        return Err(HardFilterFailure::Intrinsic("infiniband"));
    }
    if let Some(cores) = &constraints.node.cores {
        if vm_props.is_none_or(|vm| !cores.is_satisfied_by(vm.cores)) {
            return Err(HardFilterFailure::Intrinsic("cores"));
        }
    }
    if let Some(memory) = &constraints.node.memory_mb {
        if vm_props.is_none_or(|vm| !memory.is_satisfied_by(vm.memory_mb)) {
            return Err(HardFilterFailure::Intrinsic("memory"));
        }
    }
    if constraints.task.has_multi_instance && snapshot.max_tasks_per_node > 1 {
        // Multi-instance jobs require inter-node communication, which the
        // batch service only honors on exclusive-task pools; a pool that
        // schedules more than one task per node cannot host them.
        return Err(HardFilterFailure::Intrinsic("multi_instance"));
    }
    if !constraints.pool.registries.is_empty()
        && !constraints
            .pool
            .registries
            .iter()
            .all(|required| snapshot.registry_login_keys.iter().any(|key| key == required))
    {
        return Err(HardFilterFailure::Intrinsic("registries"));
    }
    Ok(())
}

/// Node filter (§4.4.4): rejects a pool whose available node flavours cannot
/// satisfy the dedicated/low-priority scope, and enforces the active-task
/// backlog ratio.
pub fn node_filter(snapshot: &PoolSnapshot, constraints: &TargetConstraints) -> Result<(), HardFilterFailure> {
    let dedicated_schedulable = snapshot.dedicated.schedulable();
    let low_priority_schedulable = snapshot.low_priority.schedulable();

    let dedicated_ok = constraints.pool.low_priority_nodes_exclusive.then_some(false).unwrap_or(dedicated_schedulable > 0);
    let low_priority_ok = constraints
        .pool
        .low_priority_nodes_allow
        .is_some_and(|allow| !allow)
        .then_some(false)
        .unwrap_or(low_priority_schedulable > 0 || snapshot.autoscale_enabled);

    if !dedicated_ok && !low_priority_ok {
        return Err(HardFilterFailure::Transient("no_schedulable_flavour"));
    }

    if let Some(backlog) = &constraints.pool.max_active_task_backlog {
        let schedulable_slots = (dedicated_schedulable + low_priority_schedulable) * snapshot.max_tasks_per_node.max(1);
        let ratio = if schedulable_slots == 0 {
            if backlog.autoscale_exempt && snapshot.autoscale_enabled {
                0.0
            } else {
                f64::from(snapshot.active_tasks_count)
            }
        } else {
            f64::from(snapshot.active_tasks_count) / f64::from(schedulable_slots)
        };
        if ratio > backlog.ratio {
            return Err(HardFilterFailure::Transient("max_active_task_backlog"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use cf_core::{NodeStateCounts, PoolIdentity, PoolState, VmProperties};

    use super::*;

    fn snapshot() -> PoolSnapshot {
        PoolSnapshot {
            identity: PoolIdentity {
                batch_account: "acct".into(),
                service_url: "https://acct.eastus.batch.azure.com".into(),
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
            blackout_until: None,
        }
    }

    #[test]
    fn gpu_prefixes_match_documented_set() {
        assert!(is_gpu_vm_size("Standard_NC6"));
        assert!(is_gpu_vm_size("standard_nv24"));
        assert!(!is_gpu_vm_size("standard_d2s_v3"));
    }

    #[test]
    fn rdma_matches_exact_and_suffix_sets() {
        assert!(is_rdma_vm_size("Standard_A8"));
        assert!(is_rdma_vm_size("standard_h16r"));
        assert!(is_rdma_vm_size("standard_h16rs_v3"));
        assert!(!is_rdma_vm_size("standard_d2s_v3"));
    }

    #[test]
    fn registry_key_substitutes_dockerhub_for_empty_server() {
        assert_eq!(registry_login_key("", "alice"), "dockerhub-alice");
        assert_eq!(registry_login_key("mycr.io", "alice"), "mycr.io-alice");
    }

    #[test]
    fn hard_filter_rejects_location_mismatch_first() {
        let constraints = TargetConstraints {
            pool: cf_core::PoolConstraints {
                location: Some("westus".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let pool = FederationPool::new(snapshot().identity);
        let failure = hard_filter(&snapshot(), &pool, &constraints).unwrap_err();
        assert_eq!(failure.reason(), "location");
        assert!(failure.is_intrinsic());
    }

    #[test]
    fn hard_filter_passes_with_no_constraints() {
        let pool = FederationPool::new(snapshot().identity);
        assert!(hard_filter(&snapshot(), &pool, &TargetConstraints::default()).is_ok());
    }

    #[test]
    fn hard_filter_matches_registries() {
        let mut snap = snapshot();
        snap.registry_login_keys = vec!["mycr.io-alice".into()];
        let constraints = TargetConstraints {
            pool: cf_core::PoolConstraints {
                registries: vec!["mycr.io-alice".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let pool = FederationPool::new(snap.identity.clone());
        assert!(hard_filter(&snap, &pool, &constraints).is_ok());

        let other_constraints = TargetConstraints {
            pool: cf_core::PoolConstraints {
                registries: vec!["other.io-bob".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(hard_filter(&snap, &pool, &other_constraints).is_err());
    }

    #[test]
    fn node_filter_rejects_zero_schedulable_when_no_autoscale() {
        let mut snap = snapshot();
        snap.dedicated = NodeStateCounts::default();
        snap.low_priority = NodeStateCounts::default();
        assert!(node_filter(&snap, &TargetConstraints::default()).is_err());
    }

    #[test]
    fn node_filter_enforces_backlog_ratio() {
        let mut snap = snapshot();
        snap.active_tasks_count = 10;
        let constraints = TargetConstraints {
            pool: cf_core::PoolConstraints {
                max_active_task_backlog: Some(cf_core::constraints::MaxActiveTaskBacklog {
                    ratio: 1.0,
                    autoscale_exempt: false,
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(node_filter(&snap, &constraints).is_err());
    }
}
