#![cfg_attr(not(feature = "libtorrent"), forbid(unsafe_code))]
#![cfg_attr(feature = "libtorrent", deny(unsafe_code))]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Cascade torrent engine: DHT-only torrent session adapter used by the
//! cascade node daemon to seed and fetch container image artifacts (§4.6).

/// Public entry point constructing and driving the torrent session.
pub mod adapter;
/// Engine command definitions accepted by the background worker.
pub mod command;
/// Error types for torrent session operations.
pub mod error;
#[cfg(feature = "libtorrent")]
pub mod ffi;
/// DHT roster table access used for bootstrap peer discovery.
pub mod roster;
/// Session abstraction and native/stub implementations.
mod session;
/// Fast-resume persistence for the node's tracked resource set.
pub mod store;
/// Strongly typed runtime configuration for the torrent session.
pub mod types;
/// Background worker that drives the torrent session.
mod worker;

pub use adapter::CascadeTorrentEngine;
pub use command::EngineCommand;
pub use error::{CascadeEngineError, CascadeEngineResult};
pub use roster::RosterHandle;
pub use store::{FastResumeStore, StoredResourceState};
pub use types::EngineRuntimeConfig;
