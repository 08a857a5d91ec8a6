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

//! Typed wrapper over blob, table, and queue object storage (C1
//! `StorageClient`): entities and queue/lease semantics are emulated over
//! [`cf_data::EntityStore`], while blob bytes live in an S3-compatible
//! backend.

mod backoff;
mod client;
mod error;
mod namespace;

pub use backoff::{BackoffPolicy, retry_transient};
pub use client::{BlobConfig, Entity, QueueMessage, StorageClient, USER_AGENT};
pub use error::{Result, StorageError, is_transient};
pub use namespace::Namespace;
