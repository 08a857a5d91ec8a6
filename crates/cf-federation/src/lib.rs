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

//! In-memory per-federation pool cache (C4): TTL'd snapshots, the
//! documented-order hard and node filters, the greedy best-fit matcher, and
//! submission patching for task dependency renumbering and IB/GPU fix-up.

mod cache;
mod error;
mod federation;
mod filter;
mod matcher;
mod submit;

pub use cache::{DEFAULT_BLACKOUT_SECS, FederationPool, NATIVE_CONTAINER_METADATA_NAME};
pub use error::{FederationError, Result};
pub use federation::Federation;
pub use filter::{HardFilterFailure, hard_filter, is_gpu_vm_size, is_rdma_vm_size, node_filter, registry_login_key};
pub use matcher::{Candidate, Flavour, Placement, candidates, scope, select};
pub use submit::{
    NodeAgentFamily, fixup_ib_mismatch, ib_mismatch, patch_pool_id, renumber_if_dependency_free, rewrite_cache_dirs,
    rewrite_merge_dependencies,
};
