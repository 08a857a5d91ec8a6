//! Cascade node daemon wiring: reconciles the resource manifest against the
//! local torrent engine and container runtime (§4.6/§4.7).
//!
//! # Design
//!
//! A resource discovered in the manifest table takes one of two paths:
//! - **Swarm path**: a qualifying torrent-info row already exists (enough
//!   known seeders) — download the `.torrent` and hand it to the engine in
//!   download mode, then load the artifact into the container runtime once
//!   the engine reports the session reached `is_seed()` (observed as a
//!   [`cf_events::Event::ResourceStateChanged`] with [`TorrentLifecycleState::SeedReady`]).
//! - **Seed path**: no qualifying row — pull the image locally, package and
//!   torrent it, and hand the already-materialized artifact to the engine in
//!   seed mode. This node never needs to "load" anything it already has.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cf_cascade_engine::{CascadeTorrentEngine, EngineRuntimeConfig, FastResumeStore, RosterHandle};
use cf_core::{Resource, ServicesRow, TorrentInfoRow, TorrentLifecycleState};
use cf_events::{Event, EventBus, EventStream};
use cf_fsops::{CascadeImageDriver, MaterializedArtifact, PullOptions, build_torrent, insert_torrent_info, merge_seeder, sha1_hex};
use cf_runtime::{CascadeResourceEntry, RuntimeStore};
use cf_storage::StorageClient;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::env::NodeEnv;
use crate::error::{AppError, AppResult};

/// Interval between manifest reconciliation passes.
const MANIFEST_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct Shared {
    storage: StorageClient,
    runtime: RuntimeStore,
    engine: CascadeTorrentEngine,
    driver: CascadeImageDriver,
    events: EventBus,
    account: String,
    pool_id: String,
    node_id: String,
    seed_bias: u32,
    tracked: Mutex<HashSet<String>>,
    pending_loads: Mutex<HashMap<String, MaterializedArtifact>>,
}

impl Shared {
    fn partition(&self) -> String {
        format!("{}${}", self.account, self.pool_id)
    }
}

/// Runs the cascade node daemon: brings up the torrent engine, then drives
/// manifest reconciliation and swarm-to-local load handoff until `cancel`
/// fires.
///
/// # Errors
///
/// Returns [`AppError::Engine`] if the torrent session cannot start, or
/// [`AppError::Runtime`] if the persisted resource catalog cannot be loaded.
pub async fn run(
    env: &NodeEnv,
    pull: PullOptions,
    storage: StorageClient,
    runtime: RuntimeStore,
    events: EventBus,
    cancel: CancellationToken,
) -> AppResult<()> {
    let roster = RosterHandle::new(storage.clone(), &env.batch_account, &env.pool_id);
    let download_root = env.node_root_dir.join("downloads");
    let resume_dir = env.node_root_dir.join("resume");
    let scratch_root = env.node_root_dir.join("scratch");

    let engine_config = EngineRuntimeConfig {
        download_root: download_root.display().to_string(),
        resume_dir: resume_dir.display().to_string(),
        listen_port: EngineRuntimeConfig::DEFAULT_LISTEN_PORT,
        dht_routers: Vec::new(),
    };
    let engine = CascadeTorrentEngine::start(
        events.clone(),
        env.node_id.clone(),
        Some(roster),
        &engine_config,
        Some(FastResumeStore::new(&resume_dir)),
    )
    .map_err(|source| AppError::engine("start", &source))?;

    let driver = CascadeImageDriver::new(scratch_root, pull);

    let resumed = runtime
        .load_resources()
        .await
        .map_err(|source| AppError::runtime("load_resources", &source))?;
    let tracked: HashSet<String> = resumed
        .iter()
        .filter(|entry| matches!(entry.state, TorrentLifecycleState::Registered))
        .map(|entry| entry.resource_hash.clone())
        .collect();
    info!(count = tracked.len(), "recovered previously registered cascade resources");

    let shared = Arc::new(Shared {
        storage,
        runtime,
        engine,
        driver,
        events: events.clone(),
        account: env.batch_account.clone(),
        pool_id: env.pool_id.clone(),
        node_id: env.node_id.clone(),
        seed_bias: pull.seed_bias,
        tracked: Mutex::new(tracked),
        pending_loads: Mutex::new(HashMap::new()),
    });

    let listener = tokio::spawn(run_load_listener(Arc::clone(&shared), events.subscribe(None), cancel.clone()));
    run_reconciliation(Arc::clone(&shared), pull.concurrent_downloads, cancel).await;
    let _ = listener.await;
    Ok(())
}

async fn run_reconciliation(shared: Arc<Shared>, concurrency: usize, cancel: CancellationToken) {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let manifest_table = shared.storage.namespace().manifest_table();
    let partition = shared.partition();
    let mut ticker = tokio::time::interval(MANIFEST_POLL_INTERVAL);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("manifest reconciliation loop cancelled");
                return;
            }
            _ = ticker.tick() => {
                reconcile_once(&shared, &manifest_table, &partition, &semaphore).await;
            }
        }
    }
}

async fn reconcile_once(shared: &Arc<Shared>, manifest_table: &str, partition: &str, semaphore: &Arc<Semaphore>) {
    let entities = match shared.storage.query_entities(manifest_table, partition).await {
        Ok(entities) => entities,
        Err(err) => {
            warn!(error = %err, "failed to poll resource manifest");
            return;
        }
    };

    for entity in entities {
        let resource_hash = entity.row_key;
        {
            let mut tracked = shared.tracked.lock().await;
            if tracked.contains(&resource_hash) {
                continue;
            }
            tracked.insert(resource_hash.clone());
        }

        let Ok(resource) = serde_json::from_value::<Resource>(entity.properties) else {
            warn!(%resource_hash, "skipping malformed manifest entity");
            continue;
        };

        let shared = Arc::clone(shared);
        let permit = Arc::clone(semaphore);
        tokio::spawn(async move {
            let _permit = permit.acquire_owned().await;
            process_new_resource(shared, resource, resource_hash).await;
        });
    }
}

async fn process_new_resource(shared: Arc<Shared>, resource: Resource, resource_hash: String) {
    if let Err(err) = try_process_new_resource(&shared, &resource, &resource_hash).await {
        warn!(resource = %resource.as_str(), error = %err, "failed to process cascade resource");
        shared.events.publish(Event::DirectDownloadFailed {
            node_id: shared.node_id.clone(),
            resource: resource.as_str().to_string(),
            message: err.to_string(),
        });
    }
}

async fn try_process_new_resource(shared: &Shared, resource: &Resource, resource_hash: &str) -> AppResult<()> {
    let partition = shared.partition();
    let torrentinfo_table = shared.storage.namespace().torrentinfo_table();
    let info_row = shared
        .storage
        .get_entity(&torrentinfo_table, &partition, resource_hash)
        .await
        .map_err(|source| AppError::storage("torrentinfo.get", source))?
        .and_then(|entity| serde_json::from_value::<TorrentInfoRow>(entity.properties).ok());

    let swarm_eligible = match &info_row {
        Some(_) => seeder_count(shared, &partition, resource_hash).await? >= shared.seed_bias as usize,
        None => false,
    };

    match (info_row, swarm_eligible) {
        (Some(row), true) => fetch_via_swarm(shared, resource, resource_hash, &row).await,
        _ => seed_fresh_pull(shared, &partition, resource, resource_hash).await,
    }
}

async fn seeder_count(shared: &Shared, partition: &str, resource_hash: &str) -> AppResult<usize> {
    let table = shared.storage.namespace().images_table();
    let entity = shared
        .storage
        .get_entity(&table, partition, resource_hash)
        .await
        .map_err(|source| AppError::storage("images.get", source))?;
    Ok(entity
        .and_then(|entity| serde_json::from_value::<ServicesRow>(entity.properties).ok())
        .map(|row| row.seeders().len())
        .unwrap_or(0))
}

async fn fetch_via_swarm(shared: &Shared, resource: &Resource, resource_hash: &str, info: &TorrentInfoRow) -> AppResult<()> {
    let (container, blob_name) = info.torrent_file_locator.split_once(',').ok_or_else(|| AppError::InvalidConfig {
        field: "torrent_file_locator",
        reason: "expected container,blob_name",
        value: Some(info.torrent_file_locator.clone()),
    })?;
    let torrent_bytes = shared
        .storage
        .download_blob_to_bytes(container, blob_name)
        .await
        .map_err(|source| AppError::storage("torrent.download", source))?
        .ok_or_else(|| AppError::InvalidConfig {
            field: "torrent_file_locator",
            reason: "referenced torrent blob is missing",
            value: Some(info.torrent_file_locator.clone()),
        })?;

    let save_path = shared.driver.scratch_path(resource_hash);
    shared
        .engine
        .add_resource(resource.as_str().to_string(), resource_hash.to_string(), torrent_bytes, save_path.display().to_string(), false)
        .await
        .map_err(|source| AppError::engine("add_resource", &source))?;

    persist_state(shared, resource, resource_hash, TorrentLifecycleState::Started, Some(save_path.display().to_string())).await?;

    let artifact = MaterializedArtifact {
        resource: resource.clone(),
        artifact_path: save_path,
        is_dir: info.is_dir,
        content_size_bytes: info.content_size_bytes,
    };
    shared.pending_loads.lock().await.insert(resource_hash.to_string(), artifact);
    Ok(())
}

async fn seed_fresh_pull(shared: &Shared, partition: &str, resource: &Resource, resource_hash: &str) -> AppResult<()> {
    shared.driver.pull(resource).await.map_err(|source| AppError::fsops("pull", source))?;
    merge_seeder(&shared.storage, &shared.account, &shared.pool_id, resource, &shared.node_id)
        .await
        .map_err(|source| AppError::fsops("merge_seeder", source))?;

    let artifact = shared.driver.package(resource).await.map_err(|source| AppError::fsops("package", source))?;
    let torrent_bytes = build_torrent(&artifact).map_err(|source| AppError::fsops("build_torrent", source))?;

    let container = shared.storage.namespace().torrent_files_container(&shared.account, &shared.pool_id);
    let blob_name = format!("{resource_hash}.torrent");
    shared
        .storage
        .upload_blob(&container, &blob_name, torrent_bytes.clone())
        .await
        .map_err(|source| AppError::storage("torrent.upload", source))?;

    let row = TorrentInfoRow {
        partition: partition.to_string(),
        resource_hash: resource_hash.to_string(),
        torrent_file_locator: format!("{container},{blob_name}"),
        torrent_file_sha1: sha1_hex(&torrent_bytes),
        is_dir: artifact.is_dir,
        content_size_bytes: artifact.content_size_bytes,
    };
    insert_torrent_info(&shared.storage, &row).await.map_err(|source| AppError::fsops("insert_torrent_info", source))?;

    shared
        .engine
        .add_resource(
            resource.as_str().to_string(),
            resource_hash.to_string(),
            torrent_bytes,
            artifact.artifact_path.display().to_string(),
            true,
        )
        .await
        .map_err(|source| AppError::engine("add_resource", &source))?;

    persist_state(shared, resource, resource_hash, TorrentLifecycleState::Registered, Some(artifact.artifact_path.display().to_string())).await
}

async fn persist_state(
    shared: &Shared,
    resource: &Resource,
    resource_hash: &str,
    state: TorrentLifecycleState,
    save_path: Option<String>,
) -> AppResult<()> {
    let entry = CascadeResourceEntry {
        resource_hash: resource_hash.to_string(),
        resource: resource.as_str().to_string(),
        state,
        torrent_file_path: None,
        save_path,
        updated_at: chrono::Utc::now(),
    };
    shared
        .runtime
        .upsert_resource(&entry)
        .await
        .map_err(|source| AppError::runtime("upsert_resource", &source))?;
    shared.events.publish(Event::ResourceStateChanged {
        node_id: shared.node_id.clone(),
        resource: resource.as_str().to_string(),
        state,
    });
    Ok(())
}

async fn run_load_listener(shared: Arc<Shared>, mut events: EventStream, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("load listener cancelled");
                return;
            }
            envelope = events.next() => {
                let Some(envelope) = envelope else {
                    info!("event bus closed, stopping load listener");
                    return;
                };
                if let Event::ResourceStateChanged { node_id, resource, state: TorrentLifecycleState::SeedReady } = envelope.event {
                    if node_id == shared.node_id {
                        handle_seed_ready(&shared, &resource).await;
                    }
                }
            }
        }
    }
}

async fn handle_seed_ready(shared: &Shared, resource_hash: &str) {
    let Some(artifact) = shared.pending_loads.lock().await.remove(resource_hash) else {
        return;
    };

    if let Err(err) = shared.driver.load(&artifact).await {
        warn!(%resource_hash, error = %err, "failed to load cascade artifact into container runtime");
        shared.pending_loads.lock().await.insert(resource_hash.to_string(), artifact);
        return;
    }

    if let Err(err) = merge_seeder(&shared.storage, &shared.account, &shared.pool_id, &artifact.resource, &shared.node_id).await {
        warn!(%resource_hash, error = %err, "failed to register as seeder after load");
        return;
    }

    if let Err(err) = persist_state(
        shared,
        &artifact.resource,
        resource_hash,
        TorrentLifecycleState::Registered,
        Some(artifact.artifact_path.display().to_string()),
    )
    .await
    {
        warn!(%resource_hash, error = %err, "failed to persist registered state after load");
    }
}
