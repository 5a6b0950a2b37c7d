//! Dispatcher
//!
//! Submits one configmap + job pair per chunk and waits for each job to finish.
//! A failed create rolls back the resource just attempted and ends the run; whatever
//! earlier chunks created is left for the sweeper.
//!
//! With `max_in_flight == 1` chunk *i* is created and awaited before chunk *i + 1* is
//! submitted. Larger values keep that many chunks in flight, stop submitting on the
//! first fatal error and drain the chunks already running.

use crate::backend::{ClusterBackend, UnitOutcome};
use crate::error::{LoadError, ResourceKind};
use crate::partition::Chunk;
use crate::payload::{PayloadBuilder, UnitPayload};
use crate::run::OrchestrationRun;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Result of one chunk whose resources were created and awaited
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub name: String,
    pub item_count: usize,
    pub outcome: UnitOutcome,
}

/// Per-chunk outcomes in chunk-index order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub chunks: Vec<ChunkReport>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.chunks.iter().filter(|c| c.outcome.is_success()).count()
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| !c.outcome.is_success())
    }
}

pub struct Dispatcher<'a> {
    run: &'a OrchestrationRun,
    backend: &'a dyn ClusterBackend,
}

impl<'a> Dispatcher<'a> {
    pub fn new(run: &'a OrchestrationRun, backend: &'a dyn ClusterBackend) -> Self {
        Self { run, backend }
    }

    pub async fn dispatch(&self, chunks: &[Chunk]) -> Result<DispatchReport, LoadError> {
        let builder = PayloadBuilder::new(self.run);
        let payloads: Vec<UnitPayload> = chunks.iter().map(|chunk| builder.build(chunk)).collect();

        info!(
            namespace = %self.run.namespace,
            chunks = payloads.len(),
            max_in_flight = self.run.max_in_flight,
            "Dispatching chunks"
        );

        let mut report = DispatchReport::default();
        if self.run.max_in_flight <= 1 {
            for payload in &payloads {
                report.chunks.push(self.dispatch_chunk(&builder, payload).await?);
            }
            return Ok(report);
        }

        let mut pending = payloads.iter();
        let mut in_flight = FuturesUnordered::new();
        let mut first_error: Option<LoadError> = None;
        loop {
            while first_error.is_none() && in_flight.len() < self.run.max_in_flight {
                match pending.next() {
                    Some(payload) => in_flight.push(self.dispatch_chunk(&builder, payload)),
                    None => break,
                }
            }
            match in_flight.next().await {
                Some(Ok(chunk)) => report.chunks.push(chunk),
                Some(Err(err)) => {
                    if first_error.is_none() {
                        error!(error = %err, "Chunk failed, no further chunks will be submitted");
                        first_error = Some(err);
                    } else {
                        error!(error = %err, "Chunk failed while draining");
                    }
                }
                None => break,
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        report.chunks.sort_by_key(|chunk| chunk.index);
        Ok(report)
    }

    async fn dispatch_chunk(
        &self,
        builder: &PayloadBuilder<'_>,
        payload: &UnitPayload,
    ) -> Result<ChunkReport, LoadError> {
        let namespace = self.run.namespace.as_str();
        let name = payload.name.as_str();

        let config = payload.config_resource();
        debug!(chunk = payload.index, name, script = %payload.script(), "Built chunk payload");
        info!(chunk = payload.index, name, items = payload.invocations.len(), "Creating configmap");
        if let Err(source) = self.backend.create_config(namespace, &config).await {
            self.rollback(ResourceKind::Config, name).await;
            return Err(LoadError::ResourceCreateFailure {
                kind: ResourceKind::Config,
                name: name.to_string(),
                source,
            });
        }

        let spec = builder.unit_spec(payload);
        info!(
            chunk = payload.index,
            name,
            deadline_secs = spec.active_deadline.as_secs(),
            "Creating job"
        );
        if let Err(source) = self.backend.create_unit(namespace, &spec).await {
            self.rollback(ResourceKind::ExecutionUnit, name).await;
            return Err(LoadError::ResourceCreateFailure {
                kind: ResourceKind::ExecutionUnit,
                name: name.to_string(),
                source,
            });
        }

        let outcome = self
            .backend
            .wait_for_completion(namespace, name, self.run.completion_timeout)
            .await
            .map_err(|source| LoadError::CompletionWaitFailure {
                name: name.to_string(),
                source,
            })?;

        match &outcome {
            UnitOutcome::Succeeded => info!(chunk = payload.index, name, "Job completed"),
            UnitOutcome::DeadlineExceeded => {
                warn!(chunk = payload.index, name, "Job hit its deadline")
            }
            UnitOutcome::Failed { reason } => {
                warn!(chunk = payload.index, name, %reason, "Job failed")
            }
        }

        Ok(ChunkReport {
            index: payload.index,
            name: name.to_string(),
            item_count: payload.invocations.len(),
            outcome,
        })
    }

    /// Best-effort removal of a resource whose creation just failed.
    async fn rollback(&self, kind: ResourceKind, name: &str) {
        let namespace = self.run.namespace.as_str();
        let result = match kind {
            ResourceKind::Config => self.backend.delete_config(namespace, name).await,
            ResourceKind::ExecutionUnit => self.backend.delete_unit(namespace, name).await,
        };
        match result {
            Ok(()) => info!(%kind, name, "Rolled back partially created resource"),
            Err(source) if source.is_not_found() => {
                debug!(%kind, name, "Nothing to roll back")
            }
            Err(source) => {
                let err = LoadError::ResourceDeleteFailure {
                    kind,
                    name: name.to_string(),
                    source,
                };
                warn!(error = %err, "Rollback failed");
            }
        }
    }
}
