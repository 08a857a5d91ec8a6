//! Background torrent worker: DHT bootstrap, command handling, and the
//! per-resource/per-minute status ticks (§4.6).

use std::collections::HashMap;
use std::time::Duration;

use cf_core::resource::TorrentLifecycleState;
use cf_events::{Event, EventBus};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::command::EngineCommand;
use crate::roster::RosterHandle;
use crate::session::CascadeSession;
use crate::store::{FastResumeStore, StoredResourceState};

const STATUS_TICK: Duration = Duration::from_secs(1);
const STATS_TICK: Duration = Duration::from_secs(60);

const BOOTSTRAP_FAST_ATTEMPTS: u32 = 600;
const BOOTSTRAP_FAST_INTERVAL: Duration = Duration::from_secs(1);
const BOOTSTRAP_MEDIUM_ATTEMPTS: u32 = 600;
const BOOTSTRAP_MEDIUM_INTERVAL: Duration = Duration::from_secs(10);
const BOOTSTRAP_SLOW_INTERVAL: Duration = Duration::from_secs(30);
const BOOTSTRAP_MIN_PEERS: u32 = 3;

struct ResourceTrack {
    state: TorrentLifecycleState,
}

/// Spawn the background worker task driving `session`. `roster` is `None`
/// only in tests that don't need real DHT peer discovery.
pub(crate) fn spawn(
    events: EventBus,
    node_id: String,
    listen_port: u16,
    roster: Option<RosterHandle>,
    commands: mpsc::Receiver<EngineCommand>,
    store: Option<FastResumeStore>,
    session: Box<dyn CascadeSession>,
) {
    tokio::spawn(run(events, node_id, listen_port, roster, commands, store, session));
}

async fn run(
    events: EventBus,
    node_id: String,
    listen_port: u16,
    roster: Option<RosterHandle>,
    mut commands: mpsc::Receiver<EngineCommand>,
    store: Option<FastResumeStore>,
    mut session: Box<dyn CascadeSession>,
) {
    if let Some(store) = &store {
        match store.load_all() {
            Ok(entries) => restore_persisted(&mut *session, entries).await,
            Err(err) => warn!(error = %err, "failed to load persisted resource state"),
        }
    }

    match &roster {
        Some(roster) => bootstrap_dht(&*session, roster, &node_id, listen_port).await,
        None => info!("no DHT roster configured, skipping bootstrap"),
    }

    let mut tracked: HashMap<String, ResourceTrack> = HashMap::new();
    let mut status_ticker = time::interval(STATUS_TICK);
    status_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats_ticker = time::interval(STATS_TICK);
    stats_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("cascade engine command channel closed, stopping worker");
                    return;
                };
                handle_command(&mut *session, &store, &mut tracked, &events, &node_id, command).await;
            }
            _ = status_ticker.tick() => {
                poll_statuses(&mut *session, &store, &mut tracked, &events, &node_id).await;
            }
            _ = stats_ticker.tick() => {
                report_dht_stats(&*session, &events).await;
            }
        }
    }
}

async fn restore_persisted(session: &mut dyn CascadeSession, entries: Vec<StoredResourceState>) {
    for entry in entries {
        info!(resource_hash = %entry.resource_hash, "restoring persisted resource");
        if let Err(err) = session
            .add_resource(&entry.resource_hash, &[], &entry.save_path, entry.seeding)
            .await
        {
            warn!(resource_hash = %entry.resource_hash, error = %err, "failed to restore persisted resource");
        }
    }
}

async fn bootstrap_dht(session: &dyn CascadeSession, roster: &RosterHandle, node_id: &str, listen_port: u16) {
    let mut attempt: u32 = 0;
    loop {
        match roster.register_and_fetch_peers(node_id, listen_port).await {
            Ok(peers) => {
                for (peer_id, peer_port) in peers {
                    // best-effort; routers outlive any single peer's downtime.
                    let _ = session.add_dht_router(&peer_id, peer_port).await;
                }
            }
            Err(err) => warn!(error = %err, "DHT roster registration failed"),
        }

        if session.dht_node_count().await >= BOOTSTRAP_MIN_PEERS {
            info!("DHT bootstrap complete");
            return;
        }

        attempt += 1;
        let wait = if attempt <= BOOTSTRAP_FAST_ATTEMPTS {
            BOOTSTRAP_FAST_INTERVAL
        } else if attempt <= BOOTSTRAP_FAST_ATTEMPTS + BOOTSTRAP_MEDIUM_ATTEMPTS {
            BOOTSTRAP_MEDIUM_INTERVAL
        } else {
            BOOTSTRAP_SLOW_INTERVAL
        };
        time::sleep(wait).await;
    }
}

async fn handle_command(
    session: &mut dyn CascadeSession,
    store: &Option<FastResumeStore>,
    tracked: &mut HashMap<String, ResourceTrack>,
    events: &EventBus,
    node_id: &str,
    command: EngineCommand,
) {
    match command {
        EngineCommand::Add { resource, resource_hash, torrent_file, save_path, seed_mode } => {
            match session.add_resource(&resource_hash, &torrent_file, &save_path, seed_mode).await {
                Ok(()) => {
                    let state = if seed_mode { TorrentLifecycleState::SeedReady } else { TorrentLifecycleState::Started };
                    tracked.insert(resource_hash.clone(), ResourceTrack { state });
                    if let Some(store) = store {
                        let persisted = StoredResourceState {
                            resource_hash: resource_hash.clone(),
                            save_path,
                            seeding: seed_mode,
                            updated_at: chrono::Utc::now(),
                        };
                        if let Err(err) = store.write(&persisted) {
                            warn!(resource_hash = %resource_hash, error = %err, "failed to persist resource state");
                        }
                    }
                    events.publish(Event::ResourceStateChanged {
                        node_id: node_id.to_string(),
                        resource,
                        state,
                    });
                }
                Err(err) => {
                    warn!(resource_hash = %resource_hash, error = %err, "failed to add resource to torrent session");
                    events.publish(Event::DirectDownloadFailed {
                        node_id: node_id.to_string(),
                        resource,
                        message: err.to_string(),
                    });
                }
            }
        }
        EngineCommand::Remove { resource_hash } => {
            if let Err(err) = session.remove_resource(&resource_hash).await {
                warn!(resource_hash = %resource_hash, error = %err, "failed to remove resource from torrent session");
            }
            tracked.remove(&resource_hash);
            if let Some(store) = store {
                if let Err(err) = store.remove(&resource_hash) {
                    warn!(resource_hash = %resource_hash, error = %err, "failed to remove persisted resource state");
                }
            }
        }
    }
}

async fn poll_statuses(
    session: &mut dyn CascadeSession,
    store: &Option<FastResumeStore>,
    tracked: &mut HashMap<String, ResourceTrack>,
    events: &EventBus,
    node_id: &str,
) {
    let statuses = match session.poll_statuses().await {
        Ok(statuses) => statuses,
        Err(err) => {
            warn!(error = %err, "failed to poll resource statuses");
            return;
        }
    };

    for status in statuses {
        let active = status.download_rate > 0
            || status.upload_rate > 0
            || status.num_peers > 0
            || (status.progress - 1.0).abs() > f32::EPSILON;
        if active {
            info!(
                resource_hash = %status.resource_hash,
                download_rate = status.download_rate,
                upload_rate = status.upload_rate,
                num_peers = status.num_peers,
                progress = status.progress,
                "cascade resource status",
            );
        }

        if status.is_seed {
            let previous = tracked.get(&status.resource_hash).map(|track| track.state);
            if previous != Some(TorrentLifecycleState::SeedReady) {
                tracked.insert(status.resource_hash.clone(), ResourceTrack { state: TorrentLifecycleState::SeedReady });
                if let Some(store) = store {
                    if let Ok(mut entries) = store.load_all() {
                        if let Some(entry) = entries.iter_mut().find(|entry| entry.resource_hash == status.resource_hash) {
                            entry.seeding = true;
                            let _ = store.write(entry);
                        }
                    }
                }
                events.publish(Event::ResourceStateChanged {
                    node_id: node_id.to_string(),
                    resource: status.resource_hash.clone(),
                    state: TorrentLifecycleState::SeedReady,
                });
            }
        }
    }
}

async fn report_dht_stats(session: &dyn CascadeSession, events: &EventBus) {
    let stats = session.dht_stats().await;
    info!(
        nodes = stats.nodes,
        torrents = stats.torrents,
        down_bytes = stats.down_bytes,
        up_bytes = stats.up_bytes,
        "cascade DHT statistics",
    );
    events.publish(Event::DhtStatsReported {
        nodes: stats.nodes,
        torrents: stats.torrents,
        down_bytes: stats.down_bytes,
        up_bytes: stats.up_bytes,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StubSession;

    #[tokio::test]
    async fn add_command_publishes_resource_state_changed() {
        let events = EventBus::with_capacity(16);
        let mut stream = events.subscribe(None);
        let mut session: Box<dyn CascadeSession> = Box::new(StubSession::default());
        let mut tracked = HashMap::new();

        handle_command(
            &mut *session,
            &None,
            &mut tracked,
            &events,
            "node-1",
            EngineCommand::Add {
                resource: "docker:alpine".into(),
                resource_hash: "hash-a".into(),
                torrent_file: Vec::new(),
                save_path: "/data/hash-a".into(),
                seed_mode: true,
            },
        )
        .await;

        assert!(tracked.contains_key("hash-a"));
        let envelope = stream.next().await.expect("event emitted");
        match envelope.event {
            Event::ResourceStateChanged { state, .. } => assert_eq!(state, TorrentLifecycleState::SeedReady),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_command_clears_tracking() {
        let events = EventBus::with_capacity(16);
        let mut session: Box<dyn CascadeSession> = Box::new(StubSession::default());
        let mut tracked = HashMap::new();
        handle_command(
            &mut *session,
            &None,
            &mut tracked,
            &events,
            "node-1",
            EngineCommand::Add {
                resource: "docker:alpine".into(),
                resource_hash: "hash-a".into(),
                torrent_file: Vec::new(),
                save_path: "/data/hash-a".into(),
                seed_mode: false,
            },
        )
        .await;
        handle_command(&mut *session, &None, &mut tracked, &events, "node-1", EngineCommand::Remove {
            resource_hash: "hash-a".into(),
        })
        .await;
        assert!(!tracked.contains_key("hash-a"));
    }

    #[tokio::test]
    async fn dht_stats_report_emits_event() {
        let events = EventBus::with_capacity(4);
        let mut stream = events.subscribe(None);
        let session = StubSession::default();
        report_dht_stats(&session, &events).await;
        let envelope = stream.next().await.expect("event emitted");
        assert_eq!(envelope.event.kind(), "dht_stats_reported");
    }

    #[tokio::test]
    async fn poll_statuses_marks_seed_ready_once() {
        let events = EventBus::with_capacity(4);
        let mut stream = events.subscribe(None);
        let mut session: Box<dyn CascadeSession> = Box::new(StubSession::default());
        let mut tracked = HashMap::new();
        handle_command(
            &mut *session,
            &None,
            &mut tracked,
            &events,
            "node-1",
            EngineCommand::Add {
                resource: "docker:alpine".into(),
                resource_hash: "hash-a".into(),
                torrent_file: Vec::new(),
                save_path: "/data/hash-a".into(),
                seed_mode: false,
            },
        )
        .await;
        // drain the Started event published by the add above
        stream.next().await.expect("add event");

        session.remove_resource("hash-a").await.expect("remove stub entry");
        session.add_resource("hash-a", &[], "/data/hash-a", true).await.expect("re-add as seeding");

        poll_statuses(&mut *session, &None, &mut tracked, &events, "node-1").await;
        let envelope = stream.next().await.expect("seed-ready event");
        assert_eq!(envelope.event.kind(), "resource_state_changed");
    }
}
