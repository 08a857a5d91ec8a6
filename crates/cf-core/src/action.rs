//! Action queue/blob schemas (§3 "ActionBlob", §6 "Action message"/"Action payload").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraints::{NodeConstraints, PoolConstraints, TaskConstraints};

/// The queue message body carried alongside every action (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMessage {
    /// Schema version; only `"1"` is recognized.
    pub version: String,
    /// Federation id the action targets.
    pub federation_id: String,
    /// Target job or job-schedule id.
    pub target: String,
    /// Unique id of this particular submission, used for sequence ordering.
    pub uuid: Uuid,
    /// HTTPS URL of the serialized [`ActionPayload`] blob.
    pub blob_data: String,
}

/// Top-level action kind: which entity type the action applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A regular job.
    Job,
    /// A recurring job-schedule.
    JobSchedule,
}

/// Action verb (§3 "ActionBlob").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionMethod {
    /// Place a new job/job-schedule (or append to an existing one).
    Add,
    /// Terminate an existing job/job-schedule.
    Terminate,
    /// Delete an existing job/job-schedule.
    Delete,
}

/// The deserialized blob payload referenced by an [`ActionMessage`] (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Schema version; only `"1"` is recognized.
    pub version: String,
    /// Verb and entity kind this payload describes.
    pub action: ActionDescriptor,
    /// The job or job-schedule target, keyed by `action.kind`.
    pub target: JobTarget,
    /// Task id -> task spec map, present for `add` actions.
    #[serde(default)]
    pub task_map: HashMap<String, TaskSpec>,
}

/// `{"method":..., "kind":...}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Add/terminate/delete.
    pub method: ActionMethod,
    /// Job or job-schedule.
    pub kind: ActionKind,
}

/// The job/job-schedule body nested under the payload's `<kind>` key (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTarget {
    /// Target job or job-schedule id.
    pub id: String,
    /// Opaque job/job-schedule spec forwarded to the batch service.
    pub data: JobSpec,
    /// Constraints evaluated by the matcher.
    #[serde(default)]
    pub constraints: TargetConstraints,
    /// Naming scheme applied when renumbering task ids on a reused job.
    pub task_naming: Option<TaskNaming>,
}

/// Bundles the three constraint groups evaluated during matching (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetConstraints {
    /// Pool-level constraints.
    #[serde(default)]
    pub pool: PoolConstraints,
    /// Compute-node constraints.
    #[serde(default)]
    pub node: NodeConstraints,
    /// Task-level constraints.
    #[serde(default)]
    pub task: TaskConstraints,
}

/// Task id prefix/padding used when renumbering on a reused job (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNaming {
    /// Prefix prepended to the zero-padded numeric suffix.
    pub prefix: String,
    /// Zero-padding width applied to the numeric suffix.
    pub padding: usize,
}

impl TaskNaming {
    /// The prefix used for merge-task ids: `merge-<prefix>` (§4.2).
    #[must_use]
    pub fn merge_prefix(&self) -> String {
        format!("merge-{}", self.prefix)
    }

    /// Formats `index` using this naming scheme's prefix and zero-padding.
    #[must_use]
    pub fn format(&self, index: u64) -> String {
        format!("{}{:0width$}", self.prefix, index, width = self.padding)
    }
}

/// Opaque job/job-schedule specification forwarded to the batch service.
///
/// Kept as a raw JSON value plus the handful of fields the matcher and
/// submission patcher (§4.4.6) need to read or rewrite directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Target pool id; rewritten by the submission patcher to the selected pool.
    pub pool_id: Option<String>,
    /// Command line of the job-preparation task, used for add-job compatibility checks.
    pub job_prep_command_line: Option<String>,
    /// Whether the job declares task dependencies.
    #[serde(default)]
    pub uses_task_dependencies: bool,
    /// `on_task_failure` policy string, used for add-job compatibility checks.
    pub on_task_failure: Option<String>,
    /// Whether inter-node communication is enabled (multi-instance support).
    #[serde(default)]
    pub enable_inter_node_communication: bool,
    /// Any remaining fields the batch service needs, passed through untouched.
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// One task entry in the payload's `task_map` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id as submitted by the caller (subject to renumbering, §4.4.6).
    pub id: String,
    /// Full command line, subject to the IB/GPU rewrite rules (§4.4.6).
    pub command_line: String,
    /// Multi-instance coordination command line, when the task is multi-instance.
    pub coordination_command_line: Option<String>,
    /// Number of instances for a multi-instance task.
    pub instance_count: Option<u32>,
    /// Dependency task ids; rewritten when renumbering merge tasks (§4.4.6).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// True if this is the job's designated merge task.
    #[serde(default)]
    pub is_merge_task: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_naming_formats_zero_padded_suffix() {
        let naming = TaskNaming {
            prefix: "task-".into(),
            padding: 5,
        };
        assert_eq!(naming.format(7), "task-00007");
        assert_eq!(naming.merge_prefix(), "merge-task-");
    }

    #[test]
    fn action_message_round_trips_through_json() {
        let message = ActionMessage {
            version: "1".into(),
            federation_id: "fed-a".into(),
            target: "job-1".into(),
            uuid: Uuid::nil(),
            blob_data: "https://acct.blob.core.windows.net/container/messages/x.pickle".into(),
        };
        let encoded = serde_json::to_string(&message).expect("serializable");
        let decoded: ActionMessage = serde_json::from_str(&encoded).expect("deserializable");
        assert_eq!(decoded.target, "job-1");
    }
}
