//! Per-federation FIFO action-processing loop (§4.5): dequeue, sequence-head
//! reconciliation, dispatch, and submission.

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
mod location;
mod processor;

pub use error::{ActionError, Result};
pub use location::LocationProperties;
pub use processor::{ActionProcessor, MAX_MESSAGES_PER_BATCH, VISIBILITY_TIMEOUT_SECS};
