#![allow(clippy::redundant_pub_crate)]

//! Session abstraction: a native libtorrent-backed implementation behind the
//! `libtorrent` feature, and an in-memory stub used in tests and non-native
//! builds.

use async_trait::async_trait;

use crate::error::CascadeEngineResult;

#[cfg(feature = "libtorrent")]
mod native;
#[cfg(any(test, not(feature = "libtorrent")))]
mod stub;

#[cfg(test)]
pub(crate) use stub::StubSession;

/// One resource's live status as reported by the underlying torrent session.
#[derive(Debug, Clone)]
pub(crate) struct ResourceStatus {
    pub resource_hash: String,
    pub is_seed: bool,
    pub download_rate: i64,
    pub upload_rate: i64,
    pub num_peers: i32,
    pub progress: f32,
}

/// Aggregate DHT health, logged once a minute (§4.6).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DhtStats {
    pub nodes: u32,
    pub torrents: u32,
    pub down_bytes: u64,
    pub up_bytes: u64,
}

/// Narrow surface the worker drives: DHT bootstrap, add/remove a resource,
/// and poll status (§4.6).
#[async_trait]
pub(crate) trait CascadeSession: Send {
    async fn add_dht_router(&mut self, host: &str, port: u16) -> CascadeEngineResult<()>;
    async fn dht_node_count(&self) -> u32;
    async fn add_resource(
        &mut self,
        resource_hash: &str,
        torrent_file: &[u8],
        save_path: &str,
        seed_mode: bool,
    ) -> CascadeEngineResult<()>;
    async fn remove_resource(&mut self, resource_hash: &str) -> CascadeEngineResult<()>;
    async fn poll_statuses(&mut self) -> CascadeEngineResult<Vec<ResourceStatus>>;
    async fn dht_stats(&self) -> DhtStats;
}

pub(crate) fn create_session(
    download_root: &str,
    listen_port: u16,
) -> CascadeEngineResult<Box<dyn CascadeSession>> {
    #[cfg(feature = "libtorrent")]
    {
        native::create_session(download_root, listen_port)
    }

    #[cfg(not(feature = "libtorrent"))]
    {
        let _ = (download_root, listen_port);
        Ok(Box::new(stub::StubSession::default()))
    }
}
