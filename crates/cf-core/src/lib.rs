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

//! Shared domain DTOs for the federation controller and the cascade distributor.
//!
//! Nothing here talks to a network or a database; this crate only defines the
//! wire/data shapes that the rest of the workspace agrees on.

pub mod action;
pub mod constraints;
pub mod error;
pub mod hashing;
pub mod pool;
pub mod resource;

pub use action::{
    ActionKind, ActionMessage, ActionMethod, ActionPayload, JobSpec, JobTarget, TargetConstraints,
    TaskNaming, TaskSpec,
};
pub use constraints::{NodeConstraints, PoolConstraints, TaskConstraints, TriState, Variance};
pub use error::{CoreError, Result};
pub use pool::{NodeStateCounts, PoolIdentity, PoolSnapshot, PoolState, VmProperties};
pub use resource::{Resource, ServicesRow, TorrentInfoRow, TorrentLifecycleState};
