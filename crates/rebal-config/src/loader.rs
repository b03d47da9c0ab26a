use std::path::Path;

use rebal_domain::{DomainError, RebalanceConfig};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawRebalanceRequest;

/// Loads a rebalance request document (YAML or JSON) from `path` and
/// returns the table name alongside the converted, validated config.
///
/// Validates eagerly what can be checked without touching the store:
/// `batchSizePerServer == 0` and `preChecks` without `dryRun`. The
/// remaining `InvalidConfig` case — `minAvailableReplicas >=
/// replicas` — needs the table's replica count and is checked at engine
/// `Init` instead.
pub fn load_request(path: &Path) -> Result<(String, RebalanceConfig), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let raw = parse(path, &content)?;
    debug!(table = %raw.table, "loaded rebalance request");
    let config = convert(&raw)?;
    Ok((raw.table, config))
}

fn parse(path: &Path, content: &str) -> Result<RawRebalanceRequest, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
                path: path.display().to_string(),
                source: e,
            })
        }
        Some("json") => serde_json::from_str(content).map_err(|e| ConfigError::JsonParse {
            path: path.display().to_string(),
            source: e,
        }),
        _ => Err(ConfigError::UnknownFormat {
            path: path.display().to_string(),
        }),
    }
}

fn convert(raw: &RawRebalanceRequest) -> Result<RebalanceConfig, ConfigError> {
    if raw.batch_size_per_server == 0 {
        return Err(DomainError::InvalidConfig("batchSizePerServer must not be 0".to_string()).into());
    }
    if raw.pre_checks && !raw.dry_run {
        return Err(DomainError::InvalidConfig("preChecks requires dryRun".to_string()).into());
    }

    Ok(RebalanceConfig {
        dry_run: raw.dry_run,
        pre_checks: raw.pre_checks,
        reassign_instances: raw.reassign_instances,
        include_consuming: raw.include_consuming,
        bootstrap: raw.bootstrap,
        downtime: raw.downtime,
        min_available_replicas: raw.min_available_replicas,
        low_disk_mode: raw.low_disk_mode,
        best_effort: raw.best_effort,
        batch_size_per_server: raw.batch_size_per_server,
        strict_replica_group: raw.strict_replica_group,
        external_view_check_interval_ms: raw.external_view_check_interval_ms,
        external_view_stabilization_timeout_ms: raw.external_view_stabilization_timeout_ms,
        minimize_data_movement: raw.minimize_data_movement,
        force_commit: raw.force_commit,
        force_commit_batch_size: raw.force_commit_batch_size,
        force_commit_batch_status_check_interval_ms: raw.force_commit_batch_status_check_interval_ms,
        force_commit_batch_status_check_timeout_ms: raw.force_commit_batch_status_check_timeout_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(content: &str, ext: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_yaml_with_defaults() {
        let file = write_fixture("table: myTable\ndryRun: true\n", "yml");
        let (table, config) = load_request(file.path()).unwrap();
        assert_eq!(table, "myTable");
        assert!(config.dry_run);
        assert_eq!(config.min_available_replicas, 1);
        assert_eq!(config.batch_size_per_server, -1);
    }

    #[test]
    fn loads_json_request() {
        let file = write_fixture(r#"{"table": "myTable", "downtime": true}"#, "json");
        let (table, config) = load_request(file.path()).unwrap();
        assert_eq!(table, "myTable");
        assert!(config.downtime);
    }

    #[test]
    fn rejects_zero_batch_size_per_server() {
        let file = write_fixture("table: t\nbatchSizePerServer: 0\n", "yml");
        let err = load_request(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Domain(DomainError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_pre_checks_without_dry_run() {
        let file = write_fixture("table: t\npreChecks: true\n", "yml");
        let err = load_request(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Domain(DomainError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = write_fixture("table: t\n", "txt");
        let err = load_request(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat { .. }));
    }
}
