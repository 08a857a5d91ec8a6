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

//! Shared Postgres-backed data access layer: a generic entity/blob/queue/lease
//! store used by both `cf-storage` (object-store emulation) and
//! `cf-federation-data` (federation/pool/sequence bookkeeping).

pub mod error;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use store::{Entity, EntityStore, QueueMessage};
