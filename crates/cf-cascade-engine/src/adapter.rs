//! Public entry point to the cascade torrent engine: constructs the native or
//! stub session, spawns the background worker, and exposes a thin command API
//! to the image driver (§4.6/§4.7).

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;

use crate::command::EngineCommand;
use crate::roster::RosterHandle;
use crate::session;
use crate::store::FastResumeStore;
use crate::types::EngineRuntimeConfig;
use crate::worker;
use cf_events::EventBus;

const COMMAND_BUFFER: usize = 128;

/// Handle to the running torrent engine for one node. Cloning shares the same
/// background worker and underlying session.
#[derive(Clone)]
pub struct CascadeTorrentEngine {
    commands: mpsc::Sender<EngineCommand>,
}

impl CascadeTorrentEngine {
    /// Start the engine: bring up the torrent session, register with the DHT
    /// roster, and spawn the background worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the native torrent session cannot be initialized
    /// or the fast-resume directory cannot be created.
    pub fn start(
        events: EventBus,
        node_id: String,
        roster: Option<RosterHandle>,
        config: &EngineRuntimeConfig,
        store: Option<FastResumeStore>,
    ) -> Result<Self> {
        if let Some(store_ref) = store.as_ref() {
            store_ref.ensure_initialized()?;
        }

        let session = session::create_session(&config.download_root, config.listen_port)
            .map_err(|err| anyhow!("failed to initialize torrent session: {err}"))?;
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        worker::spawn(events, node_id, config.listen_port, roster, rx, store, session);

        Ok(Self { commands })
    }

    /// Add a resource's torrent to the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be enqueued for the
    /// background worker.
    pub async fn add_resource(
        &self,
        resource: String,
        resource_hash: String,
        torrent_file: Vec<u8>,
        save_path: String,
        seed_mode: bool,
    ) -> Result<()> {
        self.send_command(EngineCommand::Add { resource, resource_hash, torrent_file, save_path, seed_mode })
            .await
    }

    /// Remove a resource's torrent from the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be enqueued for the
    /// background worker.
    pub async fn remove_resource(&self, resource_hash: String) -> Result<()> {
        self.send_command(EngineCommand::Remove { resource_hash }).await
    }

    async fn send_command(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|err| anyhow!("failed to enqueue cascade engine command: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_resource_enqueue_without_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let resume_dir = dir.path().join("resume");
        let store = FastResumeStore::new(&resume_dir);

        let events = EventBus::with_capacity(8);
        let config = EngineRuntimeConfig {
            download_root: dir.path().join("downloads").display().to_string(),
            resume_dir: resume_dir.display().to_string(),
            listen_port: EngineRuntimeConfig::DEFAULT_LISTEN_PORT,
            dht_routers: Vec::new(),
        };

        let engine = CascadeTorrentEngine::start(events, "node-1".into(), None, &config, Some(store))?;
        engine
            .add_resource("docker:alpine".into(), "hash-a".into(), Vec::new(), "/data/hash-a".into(), true)
            .await?;
        engine.remove_resource("hash-a".into()).await?;

        assert!(resume_dir.exists(), "fast-resume store should ensure directory exists");
        Ok(())
    }
}
