#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! In-process event bus shared by the federation controller and the cascade
//! node daemon.
//!
//! The bus provides a typed event enum, sequential identifiers, and support for
//! replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped.

pub mod error;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use cf_core::resource::TorrentLifecycleState;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;
use uuid::Uuid;

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the federation controller and the
/// cascade node daemon.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An action message was dequeued and its sequence head was resolved.
    ActionDequeued {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
        /// Uuid of the payload being processed.
        uuid: Uuid,
    },
    /// A target was placed on a pool by the matcher and submitted successfully.
    ActionMatched {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
        /// Pool id the target was placed on.
        pool_id: String,
    },
    /// A target could not be matched against any surviving pool.
    ActionBlocked {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
        /// Human-readable reason recorded alongside the blocked-action entity.
        reason: String,
    },
    /// A previously blocked target was matched successfully.
    ActionUnblocked {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
    },
    /// A job or job-schedule was terminated.
    TargetTerminated {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
    },
    /// A job or job-schedule and its location entities were deleted.
    TargetDeleted {
        /// Federation the action belongs to.
        federation_id: String,
        /// Job/job-schedule target id.
        target: String,
    },
    /// A pool was blacklisted for the remainder of the current action (§4.4.3).
    PoolBlacklisted {
        /// Federation the pool belongs to.
        federation_id: String,
        /// Pool id that was blacklisted.
        pool_id: String,
        /// Reason the pool failed the hard filter.
        reason: String,
    },
    /// The global leader lease was acquired by this process.
    GlobalLeaseAcquired,
    /// The global leader lease was lost or failed to renew.
    GlobalLeaseLost {
        /// Failure detail, when known.
        reason: String,
    },
    /// A cascade resource transitioned to a new lifecycle state on this node.
    ResourceStateChanged {
        /// Node id this event was observed on.
        node_id: String,
        /// Resource string (`docker:<image>` or `singularity:<image>`).
        resource: String,
        /// Updated lifecycle state.
        state: TorrentLifecycleState,
    },
    /// A direct-download attempt for a resource failed.
    DirectDownloadFailed {
        /// Node id this event was observed on.
        node_id: String,
        /// Resource string.
        resource: String,
        /// Human-readable failure detail.
        message: String,
    },
    /// Aggregate DHT statistics were logged (§4.6, once per minute).
    DhtStatsReported {
        /// Number of known DHT nodes.
        nodes: u32,
        /// Number of torrents the session is tracking.
        torrents: u32,
        /// Cumulative bytes downloaded across all torrents.
        down_bytes: u64,
        /// Cumulative bytes uploaded across all torrents.
        up_bytes: u64,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator used for logging and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ActionDequeued { .. } => "action_dequeued",
            Self::ActionMatched { .. } => "action_matched",
            Self::ActionBlocked { .. } => "action_blocked",
            Self::ActionUnblocked { .. } => "action_unblocked",
            Self::TargetTerminated { .. } => "target_terminated",
            Self::TargetDeleted { .. } => "target_deleted",
            Self::PoolBlacklisted { .. } => "pool_blacklisted",
            Self::GlobalLeaseAcquired => "global_lease_acquired",
            Self::GlobalLeaseLost { .. } => "global_lease_lost",
            Self::ResourceStateChanged { .. } => "resource_state_changed",
            Self::DirectDownloadFailed { .. } => "direct_download_failed",
            Self::DhtStatsReported { .. } => "dht_stats_reported",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return a snapshot of buffered events newer than the supplied identifier.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer
            .iter()
            .filter(|item| item.id > since_id)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: u64) -> Event {
        Event::ActionMatched {
            federation_id: "fed-a".into(),
            target: format!("job-{i}"),
            pool_id: "pool-1".into(),
        }
    }

    #[test]
    fn every_event_variant_has_a_kind() {
        assert_eq!(sample(0).kind(), "action_matched");
        assert_eq!(Event::GlobalLeaseAcquired.kind(), "global_lease_acquired");
        assert_eq!(
            Event::HealthChanged {
                degraded: vec!["x".into()]
            }
            .kind(),
            "health_changed"
        );
    }

    #[tokio::test]
    async fn publish_assigns_sequential_ids_and_replays_backlog() {
        let bus = EventBus::with_capacity(16);
        for i in 0..5 {
            bus.publish(sample(i));
        }
        let mut stream = bus.subscribe(Some(2));
        let mut seen = Vec::new();
        for _ in 0..3 {
            let envelope = stream.next().await.expect("replayed event");
            seen.push(envelope.id);
        }
        assert_eq!(seen, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn subscribe_without_since_replays_nothing_from_backlog() {
        let bus = EventBus::with_capacity(16);
        bus.publish(sample(0));
        let mut stream = bus.subscribe(None);
        bus.publish(sample(1));
        let envelope = stream.next().await.expect("live event");
        assert_eq!(envelope.id, 2);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_buffered_events() {
        let bus = EventBus::with_capacity(2);
        for i in 0..5 {
            bus.publish(sample(i));
        }
        let backlog = bus.backlog_since(0);
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].id, 4);
        assert_eq!(backlog[1].id, 5);
    }

    #[tokio::test]
    async fn stream_ends_after_sender_dropped() {
        let bus = EventBus::with_capacity(4);
        let mut stream = bus.subscribe(None);
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
