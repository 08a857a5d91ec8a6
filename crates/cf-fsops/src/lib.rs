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

//! Cascade image driver (C7): pulls or seeds a resource's container image,
//! packages it into a reproducible artifact, loads it into the local
//! container runtime, and records this node in the services table.

mod driver;
mod error;
mod model;
mod registry;
mod torrent;

pub use driver::CascadeImageDriver;
pub use error::{FsOpsError, FsOpsResult};
pub use model::{MaterializedArtifact, PullOptions};
pub use registry::{insert_torrent_info, merge_seeder};
pub use torrent::{PIECE_LENGTH, build_torrent, sha1_hex};
