//! `JobLocationEntity` properties (§3) serialized into an [`cf_storage::Entity`].

use chrono::{DateTime, Utc};
use cf_core::ActionKind;
use serde::{Deserialize, Serialize};

/// Properties stored on one `(target, service_url, pool_id)` location row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationProperties {
    /// Owning batch account.
    pub batch_account: String,
    /// Batch service URL.
    pub service_url: String,
    /// Pool id the target was placed on.
    pub pool_id: String,
    /// Job or job-schedule.
    pub kind: ActionKind,
    /// Every submission uuid placed on this pool for this target.
    #[serde(default)]
    pub unique_ids: Vec<String>,
    /// Timestamps paired with `unique_ids`.
    #[serde(default)]
    pub addition_timestamps: Vec<String>,
    /// Set once a terminate action has been applied; idempotent.
    pub terminate_timestamp: Option<DateTime<Utc>>,
}

impl LocationProperties {
    /// A fresh row recording a target's first placement on a pool.
    #[must_use]
    pub fn new(batch_account: String, service_url: String, pool_id: String, kind: ActionKind, unique_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            batch_account,
            service_url,
            pool_id,
            kind,
            unique_ids: vec![unique_id.to_string()],
            addition_timestamps: vec![now.to_rfc3339()],
            terminate_timestamp: None,
        }
    }

    /// Append a further submission onto an already-placed target.
    pub fn record_submission(&mut self, unique_id: &str, now: DateTime<Utc>) {
        self.unique_ids.push(unique_id.to_string());
        self.addition_timestamps.push(now.to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_location_records_the_first_submission() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let location = LocationProperties::new("acct".into(), "https://acct.eastus.batch.azure.com".into(), "pool-1".into(), ActionKind::Job, "u1", now);
        assert_eq!(location.unique_ids, vec!["u1".to_string()]);
        assert!(location.terminate_timestamp.is_none());
    }
}
