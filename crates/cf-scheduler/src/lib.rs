//! Periodic task driver (C8): federation/pool discovery and reconciliation,
//! action-queue polling, global-lease renewal, and per-pool property
//! refresh, run as cancellable background loops with a bounded worker pool.

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
#![allow(clippy::future_not_send)]

mod error;
mod registry;
mod scheduler;

pub use error::{Result, SchedulerError};
pub use registry::FederationRecord;
pub use scheduler::{
    ACTION_QUEUE_POLL_INTERVAL, FEDERATIONS_REFRESH_INTERVAL, FederationScheduler, MAX_POOL_WORKERS, POOL_PROPERTY_REFRESH_INTERVAL,
};
