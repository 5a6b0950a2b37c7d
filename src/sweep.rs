//! Cleanup Sweeper
//!
//! Deletes every job and configmap carrying the run's `app.kubernetes.io/name` label.
//! Works purely from what the cluster lists, so it also reclaims resources left
//! behind by a process that died mid-run.

use crate::backend::ClusterBackend;
use crate::error::{LoadError, ResourceKind};
use crate::run::OrchestrationRun;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub deleted_units: Vec<String>,
    pub deleted_configs: Vec<String>,
    /// Listed resources that were already gone when deleted
    pub already_absent: usize,
    /// List or delete failures, rendered
    pub failures: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Sweeper<'a> {
    run: &'a OrchestrationRun,
    backend: &'a dyn ClusterBackend,
}

impl<'a> Sweeper<'a> {
    pub fn new(run: &'a OrchestrationRun, backend: &'a dyn ClusterBackend) -> Self {
        Self { run, backend }
    }

    /// Delete all labelled jobs, then all labelled configmaps. Never fails; problems
    /// are logged and collected in the report.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        self.sweep_kind(ResourceKind::ExecutionUnit, &mut report).await;
        self.sweep_kind(ResourceKind::Config, &mut report).await;

        info!(
            namespace = %self.run.namespace,
            jobs = report.deleted_units.len(),
            configmaps = report.deleted_configs.len(),
            failures = report.failures.len(),
            "Sweep finished"
        );
        report
    }

    async fn sweep_kind(&self, kind: ResourceKind, report: &mut SweepReport) {
        let namespace = self.run.namespace.as_str();
        let selector = self.run.selector();

        let listed = match kind {
            ResourceKind::ExecutionUnit => self.backend.list_units(namespace, &selector).await,
            ResourceKind::Config => self.backend.list_configs(namespace, &selector).await,
        };
        let names = match listed {
            Ok(names) => names,
            Err(err) => {
                warn!(%kind, %selector, error = %err, "Failed to list resources for sweep");
                report
                    .failures
                    .push(format!("list {} ({}): {}", kind, selector, err));
                return;
            }
        };

        for name in names {
            let deleted = match kind {
                ResourceKind::ExecutionUnit => self.backend.delete_unit(namespace, &name).await,
                ResourceKind::Config => self.backend.delete_config(namespace, &name).await,
            };
            match deleted {
                Ok(()) => {
                    debug!(%kind, name = %name, "Deleted");
                    match kind {
                        ResourceKind::ExecutionUnit => report.deleted_units.push(name),
                        ResourceKind::Config => report.deleted_configs.push(name),
                    }
                }
                Err(source) if source.is_not_found() => report.already_absent += 1,
                Err(source) => {
                    let err = LoadError::ResourceDeleteFailure { kind, name, source };
                    warn!(error = %err, "Sweep could not delete resource");
                    report.failures.push(err.to_string());
                }
            }
        }
    }
}
