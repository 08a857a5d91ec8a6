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

//! `ConfigLoader`: reads the static YAML-or-JSON configuration document
//! shared by the federation controller and cascade node (§1.3, §6).

/// Default values for optional configuration fields.
mod defaults;
/// Configuration load errors.
pub mod error;
/// File discovery, parsing, and default resolution.
pub mod loader;
/// Typed configuration document.
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use model::{
    AfterSuccessConfig, BatchShipyardConfig, Config, LoggingConfig, RefreshIntervalsConfig,
    ResolvedConfig, SchedulingConfig, StorageConfig,
};
