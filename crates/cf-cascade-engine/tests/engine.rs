//! Integration coverage over the public adapter using the in-memory stub
//! session. Run with `--no-default-features` since the default build links
//! the native libtorrent session, which these tests don't exercise.

#![cfg(not(feature = "libtorrent"))]

use cf_cascade_engine::{CascadeTorrentEngine, EngineRuntimeConfig, FastResumeStore};
use cf_events::EventBus;

#[tokio::test]
async fn engine_add_resource_persists_and_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let resume_dir = dir.path().join("resume");
    let store = FastResumeStore::new(&resume_dir);

    let config = EngineRuntimeConfig {
        download_root: dir.path().join("downloads").display().to_string(),
        resume_dir: resume_dir.display().to_string(),
        listen_port: EngineRuntimeConfig::DEFAULT_LISTEN_PORT,
        dht_routers: Vec::new(),
    };

    let events = EventBus::with_capacity(16);
    let engine = CascadeTorrentEngine::start(events, "node-a".into(), None, &config, Some(store.clone()))?;
    engine
        .add_resource("docker:alpine".into(), "hash-a".into(), Vec::new(), "/data/hash-a".into(), true)
        .await?;

    // give the background worker a tick to process the command
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let persisted = store.load_all()?;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].resource_hash, "hash-a");
    assert!(persisted[0].seeding);

    engine.remove_resource("hash-a".into()).await?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(store.load_all()?.is_empty());

    Ok(())
}
