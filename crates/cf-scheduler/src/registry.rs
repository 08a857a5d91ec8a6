//! Federation entity shape read back from storage for bootstrap and
//! periodic reconciliation (§4.8). Pool entities deserialize directly into
//! [`cf_core::PoolIdentity`], which already carries every field a pool row
//! needs; federations need nothing beyond their configured id, since the
//! hash is always re-derived rather than stored (§3).

use serde::{Deserialize, Serialize};

/// The `federation` entity's properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationRecord {
    /// Federation id as configured.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn federation_record_round_trips_through_json() {
        let record = FederationRecord { id: "fed-a".into() };
        let encoded = serde_json::to_string(&record).expect("serializable");
        let decoded: FederationRecord = serde_json::from_str(&encoded).expect("deserializable");
        assert_eq!(decoded.id, "fed-a");
    }
}
