//! Integration test for installing the global subscriber.
//!
//! Only this module may call `init_logging`: the subscriber is process-wide and
//! all integration modules share one test binary.

use bugs_loader::logging::{init_logging, LoggingConfig};
use std::collections::HashMap;
use tempfile::TempDir;

#[test]
fn test_json_logs_written_to_configured_file() {
    let temp_dir = TempDir::new().unwrap();
    let log_file = temp_dir.path().join("logs").join("loader.log");
    let config = LoggingConfig {
        level: "info".to_string(),
        format: "json".to_string(),
        output: "file".to_string(),
        file: log_file.clone(),
        color: false,
        modules: HashMap::from([("logging_probe".to_string(), "debug".to_string())]),
    };

    init_logging(Some(&config)).unwrap();
    tracing::info!(chunk = 3, name = "bugs-loader-3", "Creating job");
    tracing::debug!(target: "logging_probe", "probe enabled");
    tracing::debug!(target: "elsewhere", "filtered out");

    let contents = std::fs::read_to_string(&log_file).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(lines
        .iter()
        .any(|l| l["fields"]["message"] == "Creating job" && l["fields"]["chunk"] == 3));
    assert!(lines.iter().any(|l| l["fields"]["message"] == "probe enabled"));
    assert!(!contents.contains("filtered out"));

    // A second install is refused.
    assert!(init_logging(Some(&config)).is_err());
}
