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

//! HTTP client over the compute-pool/job/task service (C2 `BatchClient`):
//! pool inspection, job/job-schedule lifecycle, bulk task submission with
//! chunk-shrink retry, and task-id renumbering on reused jobs.

mod chunk;
mod client;
mod error;

pub use chunk::{DEFAULT_CHUNK_SIZE, chunk_tasks, next_generic_task_id, next_merge_task_id, shrink_chunk_size};
pub use client::{BatchClient, TargetKind, USER_AGENT, renumber_task_ids};
pub use error::{BatchError, Result};
