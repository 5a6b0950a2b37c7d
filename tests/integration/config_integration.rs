//! Integration tests for layered configuration loading

use super::test_utils::with_env;
use bugs_loader::config::{global_config_path, ConfigLoader};
use bugs_loader::OrchestrationRun;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn workspace_with(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    for (name, contents) in files {
        fs::write(config_dir.join(name), contents).unwrap();
    }
    temp_dir
}

#[test]
fn test_workspace_file_overrides_defaults() {
    let workspace = workspace_with(&[(
        "config.toml",
        r#"
[run]
concurrency = 6
namespace = "vulas-staging"

[unit]
image = "registry.local/patchanalyzer:v0.0.2"
"#,
    )]);
    let xdg = TempDir::new().unwrap();

    let config = with_env(
        &[("XDG_CONFIG_HOME", xdg.path().to_str().unwrap())],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.run.concurrency, 6);
    assert_eq!(config.run.namespace, "vulas-staging");
    assert_eq!(config.run.release, "vulas-");
    assert_eq!(config.unit.image, "registry.local/patchanalyzer:v0.0.2");
    assert_eq!(config.unit.active_deadline_secs, 100);
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_file_layers_over_base() {
    let workspace = workspace_with(&[
        ("config.toml", "[run]\nconcurrency = 2\nrelease = \"base-\"\n"),
        ("ci.toml", "[run]\nconcurrency = 8\n"),
    ]);
    let xdg = TempDir::new().unwrap();

    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg.path().to_str().unwrap()),
            ("BUGS_LOADER_ENV", "ci"),
        ],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.run.concurrency, 8);
    assert_eq!(config.run.release, "base-");
}

#[test]
fn test_environment_variables_take_precedence() {
    let workspace = workspace_with(&[(
        "config.toml",
        "[run]\nconcurrency = 2\ndry_run = true\n",
    )]);
    let xdg = TempDir::new().unwrap();

    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg.path().to_str().unwrap()),
            ("BUGS_LOADER_RUN__CONCURRENCY", "5"),
            ("BUGS_LOADER_RUN__DRY_RUN", "false"),
            ("BUGS_LOADER_UNIT__POLL_INTERVAL_MS", "250"),
        ],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.run.concurrency, 5);
    assert!(!config.run.dry_run);
    assert_eq!(config.unit.poll_interval_ms, 250);
}

#[test]
fn test_global_file_is_lowest_file_layer() {
    let xdg = TempDir::new().unwrap();
    let workspace = workspace_with(&[("config.toml", "[run]\nrelease = \"workspace-\"\n")]);

    let config = with_env(&[("XDG_CONFIG_HOME", xdg.path().to_str().unwrap())], || {
        let global = global_config_path().unwrap();
        assert!(global.starts_with(xdg.path()));
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(
            &global,
            "[run]\nrelease = \"global-\"\nskip_on_error = true\n",
        )
        .unwrap();
        ConfigLoader::load(workspace.path()).unwrap()
    });

    assert_eq!(config.run.release, "workspace-");
    assert!(config.run.skip_on_error);
}

#[test]
fn test_loaded_config_builds_run() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("loader.toml");
    fs::write(
        &path,
        r#"
[run]
concurrency = 3
release = "prod-"
dry_run = false
max_in_flight = 2

[unit]
active_deadline_secs = 240
completion_timeout_secs = 900
poll_interval_ms = 500
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let run = OrchestrationRun::from_config(&config);
    assert_eq!(run.concurrency, 3);
    assert_eq!(run.release, "prod-");
    assert!(!run.dry_run);
    assert_eq!(run.max_in_flight, 2);
    assert_eq!(run.active_deadline, Duration::from_secs(240));
    assert_eq!(run.completion_timeout, Duration::from_secs(900));
    assert_eq!(run.poll_interval, Duration::from_millis(500));
}

#[test]
fn test_invalid_logging_section_fails_validation() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("loader.toml");
    fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().starts_with("logging:"));
}
