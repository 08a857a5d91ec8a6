//! Submission patching (§4.4.6): pool-id patch, `SINGULARITY_CACHEDIR`/
//! `CUDA_CACHE_PATH` rewrite, task-id renumbering, and the IB/GPU fix-up.

use std::collections::BTreeMap;

use cf_core::{JobSpec, TaskNaming, TaskSpec};

use crate::filter::is_rdma_vm_size;

/// Node-agent SKU family, used to pick the temp-disk mount point and the
/// SLES-specific RDMA device flag (§4.4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAgentFamily {
    /// `batch.node.ubuntu*`.
    Ubuntu,
    /// `batch.node.windows*`.
    Windows,
    /// `batch.node.sles*`.
    Sles,
    /// Any other published node agent (CentOS, RHEL, Debian, ...).
    Other,
}

impl NodeAgentFamily {
    /// Classify a node-agent SKU id string.
    #[must_use]
    pub fn classify(node_agent: &str) -> Self {
        if node_agent.starts_with("batch.node.ubuntu") {
            Self::Ubuntu
        } else if node_agent.starts_with("batch.node.windows") {
            Self::Windows
        } else if node_agent.starts_with("batch.node.sles") {
            Self::Sles
        } else {
            Self::Other
        }
    }

    /// Temp-disk mount point for this node-agent family (§4.4.6).
    #[must_use]
    pub const fn temp_disk_mountpoint(self) -> &'static str {
        match self {
            Self::Ubuntu => "/mnt",
            Self::Windows => "D:\\batch",
            Self::Sles | Self::Other => "/mnt/resource",
        }
    }
}

/// Patches `spec.pool_id` and rewrites `SINGULARITY_CACHEDIR`/
/// `CUDA_CACHE_PATH`-style environment hints embedded in `extra`, matching
/// the pool's temp-disk location (§4.4.6).
pub fn patch_pool_id(spec: &mut JobSpec, pool_id: &str) {
    spec.pool_id = Some(pool_id.to_string());
}

/// Rewrites an environment-variable map's cache-directory hints to the
/// node-agent family's temp-disk location.
pub fn rewrite_cache_dirs(env: &mut BTreeMap<String, String>, family: NodeAgentFamily) {
    let mount = family.temp_disk_mountpoint();
    if env.contains_key("CUDA_CACHE_PATH") {
        env.insert("CUDA_CACHE_PATH".to_string(), format!("{mount}/batch/tasks/.nv/ComputeCache"));
    }
    if env.contains_key("SINGULARITY_CACHEDIR") {
        env.insert("SINGULARITY_CACHEDIR".to_string(), format!("{mount}/singularity/cache"));
    }
}

/// Renumbers `tasks` in place when no task dependencies exist, using
/// `naming` and the already-present task ids on the reused job; no-op when
/// `has_task_dependencies` is true (§4.4.6).
pub fn renumber_if_dependency_free(
    naming: Option<&TaskNaming>,
    has_task_dependencies: bool,
    existing_task_ids: &[String],
    tasks: &mut BTreeMap<String, TaskSpec>,
) {
    let Some(naming) = naming else {
        return;
    };
    if has_task_dependencies {
        return;
    }
    cf_batch::renumber_task_ids(naming, existing_task_ids, tasks);
}

/// Rewrites a merge task's `depends_on` to the renumbered sibling ids,
/// keyed by their pre-renumber id (§4.4.6).
pub fn rewrite_merge_dependencies(old_to_new: &BTreeMap<String, String>, merge_task: &mut TaskSpec) {
    merge_task.depends_on = merge_task
        .depends_on
        .iter()
        .map(|old_id| old_to_new.get(old_id).cloned().unwrap_or_else(|| old_id.clone()))
        .collect();
}

/// The literal substring patterns rewritten by the IB/RDMA fix-up (§4.4.6).
const RDMA_MOUNT_PATTERN: &str = "/etc/rdma:/etc/rdma:ro";
const DAT_CONF_PATTERN: &str = "/etc/dat.conf:/etc/dat.conf:ro";
const SLES_DEVICE_FLAG: &str = "--device=/dev/hvnd_rdma";

/// Applies the IB/GPU fix-up to a task's command line(s) when the pool's
/// RDMA capability mismatches the task's expectation on a non-native pool
/// (§4.4.6). `command_line` and `coordination_command_line` are rewritten in
/// place.
pub fn fixup_ib_mismatch(command_line: &mut String, coordination_command_line: Option<&mut String>, family: NodeAgentFamily) {
    let replacement = if matches!(family, NodeAgentFamily::Sles) {
        format!("{DAT_CONF_PATTERN} {SLES_DEVICE_FLAG}")
    } else {
        DAT_CONF_PATTERN.to_string()
    };
    *command_line = command_line.replace(RDMA_MOUNT_PATTERN, &replacement);
    if let Some(coordination) = coordination_command_line {
        *coordination = coordination.replace(RDMA_MOUNT_PATTERN, &replacement);
    }
}

/// Whether the IB fix-up applies: the task declares an infiniband
/// expectation that disagrees with the selected pool's RDMA capability, and
/// the pool is not running the task natively (§4.4.6).
#[must_use]
pub fn ib_mismatch(task_expects_ib: bool, pool_vm_size: &str, pool_native: bool) -> bool {
    task_expects_ib != is_rdma_vm_size(pool_vm_size) && !pool_native
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_agent_family_classifies_known_prefixes() {
        assert_eq!(NodeAgentFamily::classify("batch.node.ubuntu 18.04"), NodeAgentFamily::Ubuntu);
        assert_eq!(NodeAgentFamily::classify("batch.node.windows amd64"), NodeAgentFamily::Windows);
        assert_eq!(NodeAgentFamily::classify("batch.node.sles 12"), NodeAgentFamily::Sles);
    }

    #[test]
    fn fixup_appends_sles_device_flag() {
        let mut cmd = "mount /etc/rdma:/etc/rdma:ro; run".to_string();
        fixup_ib_mismatch(&mut cmd, None, NodeAgentFamily::Sles);
        assert_eq!(cmd, "mount /etc/dat.conf:/etc/dat.conf:ro --device=/dev/hvnd_rdma; run");
    }

    #[test]
    fn fixup_omits_device_flag_on_non_sles() {
        let mut cmd = "mount /etc/rdma:/etc/rdma:ro; run".to_string();
        fixup_ib_mismatch(&mut cmd, None, NodeAgentFamily::Ubuntu);
        assert_eq!(cmd, "mount /etc/dat.conf:/etc/dat.conf:ro; run");
    }

    #[test]
    fn fixup_rewrites_coordination_command_line_too() {
        let mut cmd = "run".to_string();
        let mut coord = "/etc/rdma:/etc/rdma:ro".to_string();
        fixup_ib_mismatch(&mut cmd, Some(&mut coord), NodeAgentFamily::Ubuntu);
        assert_eq!(coord, "/etc/dat.conf:/etc/dat.conf:ro");
    }

    #[test]
    fn rewrite_cache_dirs_only_touches_present_keys() {
        let mut env = BTreeMap::new();
        env.insert("SINGULARITY_CACHEDIR".to_string(), "/old".to_string());
        rewrite_cache_dirs(&mut env, NodeAgentFamily::Ubuntu);
        assert_eq!(env.get("SINGULARITY_CACHEDIR").unwrap(), "/mnt/singularity/cache");
        assert!(!env.contains_key("CUDA_CACHE_PATH"));
    }

    #[test]
    fn ib_mismatch_is_false_on_native_pools() {
        assert!(!ib_mismatch(true, "standard_d2s_v3", true));
        assert!(ib_mismatch(true, "standard_d2s_v3", false));
        assert!(ib_mismatch(false, "standard_a8", false));
        assert!(!ib_mismatch(true, "standard_a8", false));
    }
}
