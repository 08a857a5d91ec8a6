//! DHT roster table access: registers this node and reads back peers so the
//! torrent session can seed its DHT routing table (§3, §4.6).

use cf_storage::{StorageClient, StorageError};
use serde::{Deserialize, Serialize};

use crate::error::CascadeEngineResult;

const MAX_BOOTSTRAP_PEERS: usize = 3;

#[derive(Serialize, Deserialize)]
struct DhtRosterEntry {
    port: u16,
}

/// Registers this node in the DHT roster table (`partition=account$pool,
/// row=node_id`) and reads back peers for DHT bootstrap.
#[derive(Clone)]
pub struct RosterHandle {
    storage: StorageClient,
    partition: String,
}

impl RosterHandle {
    /// Construct a roster handle scoped to one account/pool partition.
    #[must_use]
    pub fn new(storage: StorageClient, account: &str, pool_id: &str) -> Self {
        Self { storage, partition: format!("{account}${pool_id}") }
    }

    /// Upserts this node's roster row, then returns up to 3 other known
    /// peers as `(node_id, listen_port)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the roster table cannot be read or written for a
    /// reason other than this node's row already existing.
    pub async fn register_and_fetch_peers(
        &self,
        node_id: &str,
        listen_port: u16,
    ) -> CascadeEngineResult<Vec<(String, u16)>> {
        let table = self.storage.namespace().dht_table();
        let properties = serde_json::to_value(DhtRosterEntry { port: listen_port })
            .expect("DhtRosterEntry always serializes");

        match self.storage.insert(&table, &self.partition, node_id, properties.clone()).await {
            Ok(_) | Err(StorageError::AlreadyExists { .. }) => {}
            Err(source) => return Err(source.into()),
        }

        let entities = self.storage.query_entities(&table, &self.partition).await?;
        let mut peers = Vec::new();
        for entity in entities {
            if entity.row_key == node_id {
                continue;
            }
            let Ok(entry) = serde_json::from_value::<DhtRosterEntry>(entity.properties) else {
                continue;
            };
            peers.push((entity.row_key, entry.port));
            if peers.len() >= MAX_BOOTSTRAP_PEERS {
                break;
            }
        }
        Ok(peers)
    }
}
