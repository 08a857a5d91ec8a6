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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Application bootstrap wiring shared by the two daemon binaries.
//!
//! Layout: `env.rs` (environment/CLI parsing), `bootstrap.rs` (logging,
//! database, and storage client wiring shared by both daemons),
//! `controller.rs` (federation controller daemon), `node.rs` (cascade node
//! daemon), `error.rs` (application error type).

/// Service wiring shared by both daemon binaries.
pub mod bootstrap;
/// Federation controller daemon wiring.
pub mod controller;
/// Environment and CLI argument parsing.
pub mod env;
/// Application error type.
pub mod error;
/// Cascade node daemon wiring.
pub mod node;

pub use error::{AppError, AppResult};
