//! Sweep behavior against resources the current process did not create

use bugs_loader::backend::memory::{InMemoryBackend, Operation};
use bugs_loader::backend::ConfigResource;
use bugs_loader::sweep::Sweeper;
use bugs_loader::{OrchestrationRun, Orchestrator};
use std::collections::BTreeMap;
use std::sync::Arc;

fn leftover(run: &OrchestrationRun, index: usize) -> ConfigResource {
    ConfigResource {
        name: format!("bugs-loader-{}", index),
        labels: run.labels(index),
        data: BTreeMap::from([("patcheval.sh".to_string(), "#!/bin/sh\n".to_string())]),
    }
}

#[tokio::test]
async fn sweep_reclaims_leftovers_from_crashed_run() {
    let backend = Arc::new(InMemoryBackend::new());
    let run = OrchestrationRun::default();
    for index in [0, 4, 11] {
        backend.seed_config(&run.namespace, leftover(&run, index));
    }

    let report = Orchestrator::new(run.clone(), backend.clone()).sweep().await;
    assert!(report.is_clean());
    assert_eq!(report.deleted_configs.len(), 3);
    assert!(backend.config_names(&run.namespace).is_empty());
}

#[tokio::test]
async fn repeated_sweeps_are_idempotent() {
    let backend = InMemoryBackend::new();
    let run = OrchestrationRun::default();
    backend.seed_config(&run.namespace, leftover(&run, 0));

    let first = Sweeper::new(&run, &backend).sweep().await;
    let second = Sweeper::new(&run, &backend).sweep().await;
    assert_eq!(first.deleted_configs, vec!["bugs-loader-0"]);
    assert!(second.is_clean());
    assert!(second.deleted_configs.is_empty());
    assert!(second.deleted_units.is_empty());
    assert_eq!(second.already_absent, 0);
}

#[tokio::test]
async fn sweep_is_scoped_to_namespace() {
    let backend = InMemoryBackend::new();
    let run = OrchestrationRun::default();
    let other = OrchestrationRun {
        namespace: "another-team".to_string(),
        ..OrchestrationRun::default()
    };
    backend.seed_config(&run.namespace, leftover(&run, 0));
    backend.seed_config(&other.namespace, leftover(&other, 0));

    Sweeper::new(&run, &backend).sweep().await;
    assert!(backend.config_names(&run.namespace).is_empty());
    assert_eq!(backend.config_names(&other.namespace), vec!["bugs-loader-0"]);
}

#[tokio::test]
async fn failed_sweep_can_be_retried() {
    let backend = InMemoryBackend::new();
    let run = OrchestrationRun::default();
    backend.seed_config(&run.namespace, leftover(&run, 0));
    backend.fail_on(Operation::DeleteConfig, "bugs-loader-0");

    let report = Sweeper::new(&run, &backend).sweep().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(backend.config_names(&run.namespace), vec!["bugs-loader-0"]);

    backend.clear_failures();
    let report = Sweeper::new(&run, &backend).sweep().await;
    assert!(report.is_clean());
    assert!(backend.config_names(&run.namespace).is_empty());
}
