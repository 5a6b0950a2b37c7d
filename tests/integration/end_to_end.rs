//! End-to-end load runs against the in-memory backend
//!
//! Tests cover:
//! - chunk layout and resource naming
//! - rollback and fail-fast on create failures
//! - unconditional sweep after dispatch

use super::test_utils::{work_items, write_source};
use bugs_loader::backend::memory::{InMemoryBackend, Operation};
use bugs_loader::backend::UnitOutcome;
use bugs_loader::dispatch::Dispatcher;
use bugs_loader::partition::partition;
use bugs_loader::payload::SCRIPT_KEY;
use bugs_loader::sweep::Sweeper;
use bugs_loader::{LoadError, OrchestrationRun, Orchestrator, ResourceKind};
use std::sync::Arc;
use tempfile::TempDir;

fn run(concurrency: i64) -> OrchestrationRun {
    OrchestrationRun {
        concurrency,
        release: "vulas-".to_string(),
        namespace: "vulas-core".to_string(),
        ..OrchestrationRun::default()
    }
}

#[tokio::test]
async fn seven_items_three_chunks_named_by_index() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &work_items(7));
    let backend = Arc::new(InMemoryBackend::new());

    let report = Orchestrator::new(run(3), backend.clone())
        .load(&source)
        .await
        .unwrap();

    let sizes: Vec<usize> = report.dispatch.chunks.iter().map(|c| c.item_count).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(
        backend.calls(Operation::CreateUnit),
        vec!["bugs-loader-0", "bugs-loader-1", "bugs-loader-2"]
    );
    assert_eq!(report.sweep.deleted_units.len(), 3);
    assert_eq!(report.sweep.deleted_configs.len(), 3);
    assert!(backend.config_names("vulas-core").is_empty());
    assert!(backend.unit_names("vulas-core").is_empty());
}

#[tokio::test]
async fn unit_failure_at_chunk_one_leaves_earlier_chunk_for_sweep() {
    let backend = InMemoryBackend::new();
    backend.fail_on(Operation::CreateUnit, "bugs-loader-1");
    let run = run(3);
    let chunks = partition(&work_items(7), run.concurrency).unwrap();

    let err = Dispatcher::new(&run, &backend)
        .dispatch(&chunks)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::ResourceCreateFailure { kind: ResourceKind::ExecutionUnit, ref name, .. }
            if name == "bugs-loader-1"
    ));

    // Chunk 0 survives the failure; chunk 1 left its configmap behind.
    assert_eq!(backend.unit_names("vulas-core"), vec!["bugs-loader-0"]);
    assert_eq!(
        backend.config_names("vulas-core"),
        vec!["bugs-loader-0", "bugs-loader-1"]
    );
    assert_eq!(backend.calls(Operation::DeleteUnit), vec!["bugs-loader-1"]);
    assert!(!backend
        .calls(Operation::CreateConfig)
        .contains(&"bugs-loader-2".to_string()));

    let report = Sweeper::new(&run, &backend).sweep().await;
    assert!(report.is_clean());
    assert_eq!(report.deleted_units, vec!["bugs-loader-0"]);
    assert_eq!(report.deleted_configs, vec!["bugs-loader-0", "bugs-loader-1"]);
    assert!(backend.config_names("vulas-core").is_empty());
    assert!(backend.unit_names("vulas-core").is_empty());
}

#[tokio::test]
async fn fatal_dispatch_error_is_returned_after_sweep() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &work_items(7));
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail_on(Operation::CreateUnit, "bugs-loader-1");

    let err = Orchestrator::new(run(3), backend.clone())
        .load(&source)
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::ResourceCreateFailure { .. }));

    let journal = backend.journal();
    let last = journal.last().unwrap();
    assert_eq!(last.operation, Operation::DeleteConfig);
    assert!(backend.config_names("vulas-core").is_empty());
    assert!(backend.unit_names("vulas-core").is_empty());
}

#[tokio::test]
async fn leftover_from_previous_run_collides_and_is_swept() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &work_items(2));
    let backend = Arc::new(InMemoryBackend::new());
    let orchestrator = Orchestrator::new(run(2), backend.clone());

    // A previous run died after creating chunk 0's configmap.
    backend.fail_on(Operation::CreateUnit, "bugs-loader-0");
    backend.fail_on(Operation::ListConfigs, "");
    assert!(orchestrator.load(&source).await.is_err());
    assert_eq!(backend.config_names("vulas-core"), vec!["bugs-loader-0"]);

    // The next run collides on that name; its rollback removes the leftover.
    backend.clear_failures();
    let err = orchestrator.load(&source).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::ResourceCreateFailure { kind: ResourceKind::Config, .. }
    ));
    assert!(backend.config_names("vulas-core").is_empty());

    // With the namespace clean the run goes through.
    let report = orchestrator.load(&source).await.unwrap();
    assert_eq!(report.dispatch.succeeded(), 2);
}

#[tokio::test]
async fn failed_jobs_are_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &work_items(4));
    let backend = Arc::new(InMemoryBackend::new());
    backend.set_outcome(
        "bugs-loader-1",
        UnitOutcome::Failed {
            reason: "BackoffLimitExceeded".to_string(),
        },
    );

    let report = Orchestrator::new(run(2), backend.clone())
        .load(&source)
        .await
        .unwrap();
    assert_eq!(report.dispatch.succeeded(), 1);
    let failed: Vec<&str> = report
        .dispatch
        .unsuccessful()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(failed, vec!["bugs-loader-1"]);
}

#[tokio::test]
async fn scripts_survive_hostile_descriptions() {
    let backend = InMemoryBackend::new();
    let run = OrchestrationRun {
        dry_run: false,
        skip_on_error: true,
        ..run(1)
    };
    let items = work_items(3);
    let chunks = partition(&items, run.concurrency).unwrap();

    // Keep the job pending on a failed wait so the configmap can be inspected.
    backend.fail_on(Operation::Wait, "bugs-loader-0");
    assert!(Dispatcher::new(&run, &backend).dispatch(&chunks).await.is_err());

    let config = backend.config("vulas-core", "bugs-loader-0").unwrap();
    let script = &config.data[SCRIPT_KEY];
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines[0], "#!/bin/sh");
    assert_eq!(lines.len(), 4);
    for (line, item) in lines[1..].iter().zip(&items) {
        assert!(line.ends_with(" -u -sie || :"));
        assert!(line.contains(&format!("-b {}", item.reference)));
        assert!(line.contains("'Item "));
        assert!(line.contains(r"'\''single'\''"));
    }
}
