//! Static configuration loader (§1.3, §6 "Configuration file").
//!
//! # Design
//! - Parse as YAML first; if the document's first non-whitespace byte is `{`,
//!   parse as JSON instead. Matches `batch-shipyard`'s own YAML-superset-of-JSON
//!   loading behavior.
//! - Resolve every optional field against [`crate::defaults`] immediately, so
//!   the rest of the workspace only ever sees a fully-populated
//!   [`ResolvedConfig`].

use std::path::Path;

use tracing::instrument;

use crate::defaults::{
    BLACKOUT_INTERVAL, EVALUATE_AUTOSCALE, REFRESH_INTERVAL_ACTIONS, REFRESH_INTERVAL_FEDERATIONS,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{Config, ResolvedConfig};

/// Loads and resolves the configuration document at `path`.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read the file at `path`, parse it as YAML-or-JSON, and resolve
    /// defaults for any field §6 marks optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, if it parses as neither
    /// YAML nor JSON, or if a required field is missing.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<ResolvedConfig> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config = parse(path, &raw)?;
        validate(&config)?;
        Ok(resolve(config))
    }

    /// Parse and resolve an in-memory document, for callers that already
    /// hold the file contents (e.g. tests, or a value fetched from a
    /// mounted secret store rather than the local filesystem).
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` parses as neither YAML nor JSON, or if a
    /// required field is missing.
    pub fn parse_str(raw: &str) -> ConfigResult<ResolvedConfig> {
        let config = parse(Path::new("<in-memory>"), raw)?;
        validate(&config)?;
        Ok(resolve(config))
    }
}

fn parse(path: &Path, raw: &str) -> ConfigResult<Config> {
    if raw.trim_start().starts_with('{') {
        if let Ok(config) = serde_json::from_str(raw) {
            return Ok(config);
        }
    }
    serde_yaml::from_str(raw)
        .map_err(|yaml_source| ConfigError::Parse { path: path.to_path_buf(), yaml_source })
}

fn validate(config: &Config) -> ConfigResult<()> {
    if config.storage.account.trim().is_empty() {
        return Err(ConfigError::MissingField { section: "storage", field: "account" });
    }
    if config.storage.entity_prefix.trim().is_empty() {
        return Err(ConfigError::MissingField { section: "storage", field: "entity_prefix" });
    }
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::MissingField { section: "logging", field: "level" });
    }
    if config.logging.persistence && config.logging.filename.is_none() {
        return Err(ConfigError::MissingField { section: "logging", field: "filename" });
    }
    if config.batch_shipyard.version.trim().is_empty() {
        return Err(ConfigError::MissingField { section: "batch_shipyard", field: "version" });
    }
    if config.batch_shipyard.var_path.trim().is_empty() {
        return Err(ConfigError::MissingField { section: "batch_shipyard", field: "var_path" });
    }
    Ok(())
}

fn resolve(config: Config) -> ResolvedConfig {
    let refresh_interval_federations =
        config.refresh_intervals.federations.unwrap_or(REFRESH_INTERVAL_FEDERATIONS);
    let refresh_interval_actions =
        config.refresh_intervals.actions.unwrap_or(REFRESH_INTERVAL_ACTIONS);
    let blackout_interval =
        config.scheduling.after_success.blackout_interval.unwrap_or(BLACKOUT_INTERVAL);
    let evaluate_autoscale =
        config.scheduling.after_success.evaluate_autoscale.unwrap_or(EVALUATE_AUTOSCALE);

    ResolvedConfig {
        aad_cloud: config.aad_cloud,
        storage: config.storage,
        logging: config.logging,
        batch_shipyard: config.batch_shipyard,
        refresh_interval_federations,
        refresh_interval_actions,
        blackout_interval,
        evaluate_autoscale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = "
storage:
  account: myaccount
  entity_prefix: cf
logging:
  level: info
  persistence: false
batch_shipyard:
  version: \"3.9.0\"
  var_path: /mnt/batch/tasks/shared
";

    #[test]
    fn fills_in_defaults_for_omitted_groups() {
        let resolved = ConfigLoader::parse_str(MINIMAL_YAML).unwrap();
        assert_eq!(resolved.refresh_interval_federations, REFRESH_INTERVAL_FEDERATIONS);
        assert_eq!(resolved.refresh_interval_actions, REFRESH_INTERVAL_ACTIONS);
        assert_eq!(resolved.blackout_interval, BLACKOUT_INTERVAL);
        assert_eq!(resolved.evaluate_autoscale, EVALUATE_AUTOSCALE);
        assert_eq!(resolved.storage.account, "myaccount");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = format!(
            "{MINIMAL_YAML}\nrefresh_intervals:\n  federations: 60\n  actions: 10\nscheduling:\n  after_success:\n    blackout_interval: 5\n    evaluate_autoscale: true\n"
        );
        let resolved = ConfigLoader::parse_str(&yaml).unwrap();
        assert_eq!(resolved.refresh_interval_federations, 60);
        assert_eq!(resolved.refresh_interval_actions, 10);
        assert_eq!(resolved.blackout_interval, 5);
        assert!(resolved.evaluate_autoscale);
    }

    #[test]
    fn accepts_json_form() {
        let json = r#"{
            "storage": {"account": "myaccount", "entity_prefix": "cf"},
            "logging": {"level": "info", "persistence": false},
            "batch_shipyard": {"version": "3.9.0", "var_path": "/mnt/batch/tasks/shared"}
        }"#;
        let resolved = ConfigLoader::parse_str(json).unwrap();
        assert_eq!(resolved.storage.account, "myaccount");
    }

    #[test]
    fn rejects_missing_storage_account() {
        let yaml = "
storage:
  account: \"\"
  entity_prefix: cf
logging:
  level: info
  persistence: false
batch_shipyard:
  version: \"3.9.0\"
  var_path: /mnt/batch/tasks/shared
";
        let err = ConfigLoader::parse_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { section: "storage", field: "account" }
        ));
    }

    #[test]
    fn rejects_persistence_without_filename() {
        let yaml = "
storage:
  account: myaccount
  entity_prefix: cf
logging:
  level: info
  persistence: true
batch_shipyard:
  version: \"3.9.0\"
  var_path: /mnt/batch/tasks/shared
";
        let err = ConfigLoader::parse_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { section: "logging", field: "filename" }
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL_YAML).unwrap();

        let resolved = ConfigLoader::load(&path).unwrap();
        assert_eq!(resolved.storage.account, "myaccount");
    }
}
