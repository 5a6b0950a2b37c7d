//! Load orchestration
//!
//! Source -> partition -> dispatch -> sweep. Source and partition errors end the run
//! before anything exists on the cluster; once dispatch has started the sweep always
//! runs, and a dispatch error is returned only after it.

use crate::backend::kubeconfig::ClusterConnection;
use crate::backend::{ClusterBackend, KubernetesBackend};
use crate::config::LoaderConfig;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::LoadError;
use crate::partition::partition;
use crate::run::OrchestrationRun;
use crate::source::load_work_items;
use crate::sweep::{SweepReport, Sweeper};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Summary of a completed load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: usize,
    pub chunks: usize,
    pub dispatch: DispatchReport,
    pub sweep: SweepReport,
}

pub struct Orchestrator {
    run: OrchestrationRun,
    backend: Arc<dyn ClusterBackend>,
}

impl Orchestrator {
    pub fn new(run: OrchestrationRun, backend: Arc<dyn ClusterBackend>) -> Self {
        Self { run, backend }
    }

    /// Validate `config` and connect to the cluster it points at.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, LoadError> {
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            LoadError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;

        let connection = ClusterConnection::resolve(config.cluster.kubeconfig.as_deref())?;
        if let Some(context_namespace) = &connection.namespace {
            if context_namespace != &config.run.namespace {
                debug!(
                    context_namespace = %context_namespace,
                    namespace = %config.run.namespace,
                    "Kubeconfig context namespace differs from configured namespace; using configured"
                );
            }
        }

        let run = OrchestrationRun::from_config(config);
        let backend = KubernetesBackend::new(
            &connection,
            Duration::from_secs(config.cluster.request_timeout_secs),
            run.poll_interval,
        )?;
        Ok(Self::new(run, Arc::new(backend)))
    }

    pub fn run(&self) -> &OrchestrationRun {
        &self.run
    }

    /// Load the work items at `source` and push them through the cluster.
    pub async fn load(&self, source: &Path) -> Result<LoadReport, LoadError> {
        let started_at = Utc::now();
        info!(
            source = %source.display(),
            release = %self.run.release,
            namespace = %self.run.namespace,
            concurrency = self.run.concurrency,
            dry_run = self.run.dry_run,
            skip_on_error = self.run.skip_on_error,
            "Starting load"
        );

        let items = load_work_items(source).await?;
        let chunks = partition(&items, self.run.concurrency)?;
        info!(items = items.len(), chunks = chunks.len(), "Partitioned work items");

        let dispatched = Dispatcher::new(&self.run, self.backend.as_ref())
            .dispatch(&chunks)
            .await;
        let sweep = self.sweep().await;

        let dispatch = match dispatched {
            Ok(dispatch) => dispatch,
            Err(err) => {
                error!(error = %err, "Load aborted");
                return Err(err);
            }
        };

        for chunk in dispatch.unsuccessful() {
            warn!(chunk = chunk.index, name = %chunk.name, outcome = ?chunk.outcome, "Chunk did not succeed");
        }
        let report = LoadReport {
            started_at,
            finished_at: Utc::now(),
            items: items.len(),
            chunks: chunks.len(),
            dispatch,
            sweep,
        };
        info!(
            succeeded = report.dispatch.succeeded(),
            chunks = report.chunks,
            "Load finished"
        );
        Ok(report)
    }

    /// Remove every resource carrying this run's labels.
    pub async fn sweep(&self) -> SweepReport {
        Sweeper::new(&self.run, self.backend.as_ref()).sweep().await
    }
}
