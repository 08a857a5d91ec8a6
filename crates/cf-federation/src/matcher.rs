//! Greedy best-fit matching (§4.4.5).

use cf_core::{NodeStateCounts, PoolSnapshot, TargetConstraints};

/// Which node flavour(s) a candidate bin serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    /// Dedicated-only capacity.
    Dedicated,
    /// Low-priority-only capacity.
    LowPriority,
    /// Either flavour combined.
    Both,
}

/// One candidate pool's available capacity for a match attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Pool identifier (service URL + pool id).
    pub pool_id: String,
    /// Snapshot backing this candidate.
    pub idle_slots: u32,
    /// Idle + running slots.
    pub available_slots: u32,
    /// Whether the pool is autoscale-enabled and not presently resizing
    /// (treated as steady for the purposes of backlog acceptance).
    pub autoscale_steady: bool,
}

fn slots(counts: &NodeStateCounts, max_tasks_per_node: u32) -> (u32, u32) {
    let idle = counts.idle * max_tasks_per_node.max(1);
    let available = counts.schedulable() * max_tasks_per_node.max(1);
    (idle, available)
}

/// Builds the candidate capacity view for `pools` respecting the
/// dedicated/low-priority/both scope implied by `constraints` (§4.4.5 step 1).
#[must_use]
pub fn candidates(pools: &[(&str, &PoolSnapshot)], constraints: &TargetConstraints) -> Vec<Candidate> {
    let flavour = scope(constraints);
    pools
        .iter()
        .map(|(pool_id, snapshot)| {
            let (dedicated_idle, dedicated_avail) = slots(&snapshot.dedicated, snapshot.max_tasks_per_node);
            let (lp_idle, lp_avail) = slots(&snapshot.low_priority, snapshot.max_tasks_per_node);
            let (idle, available) = match flavour {
                Flavour::Dedicated => (dedicated_idle, dedicated_avail),
                Flavour::LowPriority => (lp_idle, lp_avail),
                Flavour::Both => (dedicated_idle + lp_idle, dedicated_avail + lp_avail),
            };
            Candidate {
                pool_id: (*pool_id).to_string(),
                idle_slots: idle,
                available_slots: available,
                autoscale_steady: snapshot.autoscale_enabled,
            }
        })
        .collect()
}

/// Which flavour scope a target's constraints imply (§4.4.5 step 1).
#[must_use]
pub fn scope(constraints: &TargetConstraints) -> Flavour {
    if constraints.pool.low_priority_nodes_exclusive {
        Flavour::LowPriority
    } else if constraints.pool.low_priority_nodes_allow == Some(false) {
        Flavour::Dedicated
    } else {
        Flavour::Both
    }
}

/// Outcome of a match attempt: the selected pool and whether the placement
/// accepts backlog (capacity was insufficient but permitted anyway).
#[derive(Debug, Clone)]
pub struct Placement {
    /// Selected pool id.
    pub pool_id: String,
    /// Whether this placement was accepted despite insufficient idle/available
    /// capacity (steps 4 and 5 of §4.4.5).
    pub accepted_backlog: bool,
}

/// Runs the five-step selection policy for `required` units of capacity
/// (vms-per-task for multi-instance jobs, total slots otherwise) against
/// `candidates`, sorted descending by capacity within each step (§4.4.5).
#[must_use]
pub fn select(mut pool_candidates: Vec<Candidate>, required: u32, slot_based_only: bool) -> Option<Placement> {
    // Step 2: largest-fitting idle pool first.
    pool_candidates.sort_by(|a, b| b.idle_slots.cmp(&a.idle_slots));
    if let Some(candidate) = pool_candidates.iter().find(|candidate| candidate.idle_slots >= required) {
        return Some(Placement {
            pool_id: candidate.pool_id.clone(),
            accepted_backlog: false,
        });
    }

    // Step 3: largest-fitting available (idle + running) pool.
    pool_candidates.sort_by(|a, b| b.available_slots.cmp(&a.available_slots));
    if let Some(candidate) = pool_candidates.iter().find(|candidate| candidate.available_slots >= required) {
        return Some(Placement {
            pool_id: candidate.pool_id.clone(),
            accepted_backlog: false,
        });
    }

    // Step 4: any autoscale-enabled steady pool, accepting backlog.
    if let Some(candidate) = pool_candidates.iter().find(|candidate| candidate.autoscale_steady) {
        return Some(Placement {
            pool_id: candidate.pool_id.clone(),
            accepted_backlog: true,
        });
    }

    // Step 5: slot-based scheduling only — largest non-empty pool, accepting backlog.
    if slot_based_only {
        if let Some(candidate) = pool_candidates.iter().find(|candidate| candidate.available_slots > 0) {
            return Some(Placement {
                pool_id: candidate.pool_id.clone(),
                accepted_backlog: true,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, idle: u32, available: u32, autoscale: bool) -> Candidate {
        Candidate {
            pool_id: id.to_string(),
            idle_slots: idle,
            available_slots: available,
            autoscale_steady: autoscale,
        }
    }

    #[test]
    fn prefers_smallest_idle_pool_that_still_fits() {
        let candidates = vec![candidate("small", 4, 4, false), candidate("big", 8, 8, false)];
        let placement = select(candidates, 6, true).expect("placement");
        assert_eq!(placement.pool_id, "big");
        assert!(!placement.accepted_backlog);
    }

    #[test]
    fn falls_back_to_available_when_no_idle_fits() {
        let candidates = vec![candidate("p1", 2, 8, false)];
        let placement = select(candidates, 6, true).expect("placement");
        assert_eq!(placement.pool_id, "p1");
        assert!(!placement.accepted_backlog);
    }

    #[test]
    fn autoscale_steady_accepts_backlog_over_capacity() {
        let candidates = vec![candidate("p1", 0, 0, true)];
        let placement = select(candidates, 6, true).expect("placement");
        assert!(placement.accepted_backlog);
    }

    #[test]
    fn slot_based_fallback_only_applies_to_non_multi_instance() {
        let candidates = vec![candidate("p1", 0, 2, false)];
        assert!(select(candidates.clone(), 6, false).is_none());
        let placement = select(candidates, 6, true).expect("placement");
        assert!(placement.accepted_backlog);
    }

    #[test]
    fn scope_reflects_low_priority_constraints() {
        let mut constraints = TargetConstraints::default();
        assert_eq!(scope(&constraints), Flavour::Both);
        constraints.pool.low_priority_nodes_exclusive = true;
        assert_eq!(scope(&constraints), Flavour::LowPriority);
        constraints.pool.low_priority_nodes_exclusive = false;
        constraints.pool.low_priority_nodes_allow = Some(false);
        assert_eq!(scope(&constraints), Flavour::Dedicated);
    }
}
