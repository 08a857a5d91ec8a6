//! Constraint types evaluated by the federation matcher (§4.4.2).

use serde::{Deserialize, Serialize};

/// A constraint that can require, forbid, or ignore a property (gpu/infiniband, §4.4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    /// The property must be present.
    Require,
    /// The property must be absent.
    Forbid,
    /// No preference either way.
    #[default]
    Any,
}

impl TriState {
    /// Evaluate the tri-state against an observed boolean property.
    #[must_use]
    pub const fn is_satisfied_by(self, present: bool) -> bool {
        match self {
            Self::Require => present,
            Self::Forbid => !present,
            Self::Any => true,
        }
    }
}

/// Numeric constraint with an allowed variance above a floor value.
///
/// `variance == 0` requires exact equality; `variance == None` places no upper
/// bound; a positive variance bounds the acceptable range to
/// `[amount, amount * (1 + variance)]` (§4.4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Variance {
    /// Required floor value.
    pub amount: f64,
    /// Allowed fractional variance above `amount`, or `None` for unbounded.
    pub schedulable_variance: Option<f64>,
}

impl Variance {
    /// True when `observed` satisfies this constraint.
    #[must_use]
    pub fn is_satisfied_by(&self, observed: f64) -> bool {
        match self.schedulable_variance {
            Some(variance) if variance == 0.0 => (observed - self.amount).abs() < f64::EPSILON,
            Some(variance) => observed >= self.amount && observed <= self.amount * (1.0 + variance),
            None => observed >= self.amount,
        }
    }
}

/// Pool-level constraints (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolConstraints {
    /// Required pool location/region.
    pub location: Option<String>,
    /// Required virtual-network ARM resource id.
    pub virtual_network_arm_id: Option<String>,
    /// Required custom-image ARM resource id.
    pub custom_image_arm_id: Option<String>,
    /// Whether the pool must (or must not) be a Windows pool.
    pub windows: Option<bool>,
    /// Whether the pool must (or must not) be native-container enabled.
    pub native: Option<bool>,
    /// Whether autoscale must be allowed on the selected pool.
    pub autoscale_allow: Option<bool>,
    /// Whether the pool must be exclusively autoscale-enabled.
    pub autoscale_exclusive: bool,
    /// Whether low-priority nodes are allowed on the selected pool.
    pub low_priority_nodes_allow: Option<bool>,
    /// Whether the pool must be exclusively low-priority.
    pub low_priority_nodes_exclusive: bool,
    /// Acceptable `"<server>-<username>"` registry login keys (§4.4.3).
    #[serde(default)]
    pub registries: Vec<String>,
    /// Active-task backlog ratio ceiling and exemption flag.
    pub max_active_task_backlog: Option<MaxActiveTaskBacklog>,
}

/// Backlog-ratio constraint (§4.4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaxActiveTaskBacklog {
    /// Maximum allowed `active_tasks / schedulable_slots` ratio.
    pub ratio: f64,
    /// When true, pools with zero schedulable slots and steady autoscale are exempt.
    pub autoscale_exempt: bool,
}

/// Compute-node constraints (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConstraints {
    /// Exact VM size required, if any.
    pub vm_size: Option<String>,
    /// Core-count constraint.
    pub cores: Option<Variance>,
    /// Memory constraint, normalized to MB.
    pub memory_mb: Option<Variance>,
    /// Requires `max_tasks_per_node == 1`.
    pub exclusive: bool,
    /// GPU presence constraint, matched against the VM-size GPU prefix set.
    pub gpu: TriState,
    /// InfiniBand presence constraint, matched against the IB VM-size suffix set.
    pub infiniband: TriState,
}

/// Task-level constraints (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskConstraints {
    /// Requires `enable_inter_node_communication` on the job.
    pub has_multi_instance: bool,
    /// Whether the task graph declares dependencies.
    pub has_task_dependencies: bool,
    /// Whether the job auto-completes once all tasks finish.
    pub auto_complete: bool,
    /// Maximum instance count for a multi-instance task.
    pub instance_counts_max: Option<u32>,
    /// Total instance count across all multi-instance tasks.
    pub instance_counts_total: Option<u32>,
    /// Number of tasks expected per recurrence (job-schedule targets).
    pub tasks_per_recurrence: Option<u32>,
    /// Identifier of the merge task, when one is declared.
    pub merge_task_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_zero_requires_exact_match() {
        let variance = Variance {
            amount: 4.0,
            schedulable_variance: Some(0.0),
        };
        assert!(variance.is_satisfied_by(4.0));
        assert!(!variance.is_satisfied_by(4.5));
    }

    #[test]
    fn variance_none_has_no_upper_bound() {
        let variance = Variance {
            amount: 4.0,
            schedulable_variance: None,
        };
        assert!(variance.is_satisfied_by(1000.0));
        assert!(!variance.is_satisfied_by(3.9));
    }

    #[test]
    fn variance_positive_bounds_range() {
        let variance = Variance {
            amount: 10.0,
            schedulable_variance: Some(0.5),
        };
        assert!(variance.is_satisfied_by(15.0));
        assert!(!variance.is_satisfied_by(15.1));
    }

    #[test]
    fn tri_state_matches_expected_truth_table() {
        assert!(TriState::Require.is_satisfied_by(true));
        assert!(!TriState::Require.is_satisfied_by(false));
        assert!(TriState::Forbid.is_satisfied_by(false));
        assert!(!TriState::Forbid.is_satisfied_by(true));
        assert!(TriState::Any.is_satisfied_by(true));
        assert!(TriState::Any.is_satisfied_by(false));
    }
}
