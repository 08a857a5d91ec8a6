use async_trait::async_trait;
use cxx::UniquePtr;

use crate::error::{CascadeEngineError, CascadeEngineResult};
use crate::ffi::ffi;

use super::{CascadeSession, DhtStats, ResourceStatus};

pub(super) struct NativeSession {
    inner: UniquePtr<ffi::Session>,
}

pub(super) fn create_session(
    download_root: &str,
    listen_port: u16,
) -> CascadeEngineResult<Box<dyn CascadeSession>> {
    let options = ffi::SessionOptions {
        download_root: download_root.to_string(),
        listen_port: i32::from(listen_port),
    };
    let inner = ffi::new_session(&options);
    if inner.is_null() {
        return Err(CascadeEngineError::SessionUnavailable { operation: "new_session" });
    }
    Ok(Box::new(NativeSession { inner }))
}

impl NativeSession {
    fn map_failure(operation: &'static str, message: String) -> CascadeEngineResult<()> {
        if message.is_empty() {
            Ok(())
        } else {
            Err(CascadeEngineError::NativeFailure { operation, message })
        }
    }

    fn session_mut(&mut self) -> std::pin::Pin<&mut ffi::Session> {
        self.inner
            .as_mut()
            .expect("native session must be initialized")
    }
}

#[async_trait]
impl CascadeSession for NativeSession {
    async fn add_dht_router(&mut self, host: &str, port: u16) -> CascadeEngineResult<()> {
        let added = self.session_mut().add_dht_router(host, port);
        if added {
            Ok(())
        } else {
            Err(CascadeEngineError::NativeFailure {
                operation: "add_dht_router",
                message: format!("router {host}:{port} was rejected"),
            })
        }
    }

    async fn dht_node_count(&self) -> u32 {
        self.inner
            .as_ref()
            .expect("native session must be initialized")
            .dht_node_count()
    }

    async fn add_resource(
        &mut self,
        resource_hash: &str,
        torrent_file: &[u8],
        save_path: &str,
        seed_mode: bool,
    ) -> CascadeEngineResult<()> {
        let request = ffi::AddResourceRequest {
            resource_hash: resource_hash.to_string(),
            torrent_file: torrent_file.to_vec(),
            save_path: save_path.to_string(),
            seed_mode,
        };
        let message = self.session_mut().add_resource(&request);
        Self::map_failure("add_resource", message)
    }

    async fn remove_resource(&mut self, resource_hash: &str) -> CascadeEngineResult<()> {
        let message = self.session_mut().remove_resource(resource_hash);
        Self::map_failure("remove_resource", message)
    }

    async fn poll_statuses(&mut self) -> CascadeEngineResult<Vec<ResourceStatus>> {
        let statuses = self.session_mut().poll_statuses();
        Ok(statuses
            .into_iter()
            .map(|status| ResourceStatus {
                resource_hash: status.resource_hash,
                is_seed: status.is_seed,
                download_rate: status.download_rate,
                upload_rate: status.upload_rate,
                num_peers: status.num_peers,
                progress: status.progress,
            })
            .collect())
    }

    async fn dht_stats(&self) -> DhtStats {
        let stats = self
            .inner
            .as_ref()
            .expect("native session must be initialized")
            .dht_stats();
        DhtStats {
            nodes: stats.nodes,
            torrents: stats.torrents,
            down_bytes: stats.down_bytes,
            up_bytes: stats.up_bytes,
        }
    }
}
