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

//! Logging initialisation shared by the cascade daemons.
//!
//! Layout: `init.rs` (tracing subscriber setup, stdout + optional rolling
//! file layer, optional OpenTelemetry exporter).

pub mod init;

pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, LoggingGuard, OpenTelemetryConfig,
    OpenTelemetryGuard, build_sha, init_logging, init_logging_with_otel, log_format_from_config,
};
