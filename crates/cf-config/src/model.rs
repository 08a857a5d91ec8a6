//! Typed configuration document.
//!
//! # Design
//! - One struct per key group, matching the on-disk YAML/JSON layout exactly.
//! - Optional fields use `Option` and are filled in by [`crate::defaults`] rather
//!   than by `#[serde(default = ...)]`, so a missing-vs-zero distinction stays
//!   visible to callers that care (see `scheduling.after_success`).

use serde::Deserialize;

/// Top-level configuration document (§6 "Configuration file").
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Azure AD cloud environment name (e.g. `AzurePublicCloud`).
    pub aad_cloud: Option<String>,
    /// Storage account connection details.
    pub storage: StorageConfig,
    /// Logging sink configuration.
    pub logging: LoggingConfig,
    /// `batch_shipyard` compatibility metadata.
    pub batch_shipyard: BatchShipyardConfig,
    /// Poll interval overrides.
    #[serde(default)]
    pub refresh_intervals: RefreshIntervalsConfig,
    /// Post-success scheduling behavior.
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

/// `storage.*` key group.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage account name.
    pub account: String,
    /// Storage account key. Absent when credentials come from the
    /// environment (`SHIPYARD_STORAGE_ENV`) instead of the file.
    pub account_key: Option<String>,
    /// Storage endpoint suffix, e.g. `core.windows.net`.
    pub endpoint: Option<String>,
    /// Resource group the storage account lives in.
    pub resource_group: Option<String>,
    /// Prefix prepended to every container/table/queue name.
    pub entity_prefix: String,
}

/// `logging.*` key group.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` `EnvFilter` directive, e.g. `info` or `cf_federation=debug`.
    pub level: String,
    /// Whether file persistence is enabled.
    pub persistence: bool,
    /// Log file name, used when `persistence` is set. Rotated by the
    /// telemetry crate's rolling appender.
    pub filename: Option<String>,
}

/// `batch_shipyard.*` key group.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchShipyardConfig {
    /// `batch-shipyard` compatibility version string.
    pub version: String,
    /// Path to the variable directory shared with the batch node agent.
    pub var_path: String,
}

/// `refresh_intervals.*` key group, in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshIntervalsConfig {
    /// Federation cache refresh interval, in seconds.
    pub federations: Option<u64>,
    /// Action queue poll interval, in seconds.
    pub actions: Option<u64>,
}

/// `scheduling.*` key group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulingConfig {
    /// `scheduling.after_success.*` key group.
    #[serde(default)]
    pub after_success: AfterSuccessConfig,
}

/// `scheduling.after_success.*` key group (§4.8).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AfterSuccessConfig {
    /// Blackout window after a successful task schedule, in seconds.
    pub blackout_interval: Option<u64>,
    /// Whether to immediately nudge the batch service to re-evaluate
    /// autoscale targets after a successful schedule.
    pub evaluate_autoscale: Option<bool>,
}

/// [`Config`] with every optional field resolved against
/// [`crate::defaults`]. This is the type the rest of the workspace consumes.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Azure AD cloud environment name, if configured.
    pub aad_cloud: Option<String>,
    /// Storage account connection details.
    pub storage: StorageConfig,
    /// Logging sink configuration.
    pub logging: LoggingConfig,
    /// `batch_shipyard` compatibility metadata.
    pub batch_shipyard: BatchShipyardConfig,
    /// Federation cache refresh interval, in seconds.
    pub refresh_interval_federations: u64,
    /// Action queue poll interval, in seconds.
    pub refresh_interval_actions: u64,
    /// Post-success blackout window, in seconds.
    pub blackout_interval: u64,
    /// Whether to nudge autoscale re-evaluation after a successful schedule.
    pub evaluate_autoscale: bool,
}
