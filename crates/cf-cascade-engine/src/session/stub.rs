use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{CascadeEngineError, CascadeEngineResult};

use super::{CascadeSession, DhtStats, ResourceStatus};

#[derive(Clone, Default)]
struct StubResource {
    save_path: String,
    seeding: bool,
}

/// In-memory test double for the torrent session interface. Never contacts
/// the network; peers/rates stay at zero and `is_seed` mirrors whatever
/// `seed_mode` the resource was added with.
#[derive(Default)]
pub(crate) struct StubSession {
    routers: Vec<(String, u16)>,
    resources: HashMap<String, StubResource>,
}

#[async_trait]
impl CascadeSession for StubSession {
    async fn add_dht_router(&mut self, host: &str, port: u16) -> CascadeEngineResult<()> {
        self.routers.push((host.to_string(), port));
        Ok(())
    }

    async fn dht_node_count(&self) -> u32 {
        u32::try_from(self.routers.len()).unwrap_or(u32::MAX)
    }

    async fn add_resource(
        &mut self,
        resource_hash: &str,
        _torrent_file: &[u8],
        save_path: &str,
        seed_mode: bool,
    ) -> CascadeEngineResult<()> {
        self.resources.insert(
            resource_hash.to_string(),
            StubResource { save_path: save_path.to_string(), seeding: seed_mode },
        );
        Ok(())
    }

    async fn remove_resource(&mut self, resource_hash: &str) -> CascadeEngineResult<()> {
        if self.resources.remove(resource_hash).is_some() {
            Ok(())
        } else {
            Err(CascadeEngineError::InvalidInput {
                field: "resource_hash",
                reason: "no resource with this hash is tracked",
            })
        }
    }

    async fn poll_statuses(&mut self) -> CascadeEngineResult<Vec<ResourceStatus>> {
        Ok(self
            .resources
            .iter()
            .map(|(hash, resource)| ResourceStatus {
                resource_hash: hash.clone(),
                is_seed: resource.seeding,
                download_rate: 0,
                upload_rate: 0,
                num_peers: 0,
                progress: if resource.seeding { 1.0 } else { 0.0 },
            })
            .collect())
    }

    async fn dht_stats(&self) -> DhtStats {
        DhtStats {
            nodes: u32::try_from(self.routers.len()).unwrap_or(u32::MAX),
            torrents: u32::try_from(self.resources.len()).unwrap_or(u32::MAX),
            down_bytes: 0,
            up_bytes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_round_trips() {
        let mut session = StubSession::default();
        session.add_resource("hash-a", &[], "/tmp/a", false).await.expect("add succeeds");
        let statuses = session.poll_statuses().await.expect("poll succeeds");
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].resource_hash, "hash-a");
        assert!(!statuses[0].is_seed);

        session.remove_resource("hash-a").await.expect("remove succeeds");
        assert!(session.poll_statuses().await.expect("poll succeeds").is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_resource_errors() {
        let mut session = StubSession::default();
        let err = session.remove_resource("missing").await.expect_err("must error");
        assert!(matches!(err, CascadeEngineError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn dht_node_count_tracks_added_routers() {
        let mut session = StubSession::default();
        session.add_dht_router("router.example", 6881).await.expect("router accepted");
        session.add_dht_router("router2.example", 6881).await.expect("router accepted");
        assert_eq!(session.dht_node_count().await, 2);
    }
}
