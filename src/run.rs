//! Orchestration run context
//!
//! Immutable view of one load invocation, built from [`LoaderConfig`] and handed by
//! reference to every component.

use crate::backend::LabelSelector;
use crate::config::LoaderConfig;
use std::collections::BTreeMap;
use std::time::Duration;

/// Resource name prefix and `app.kubernetes.io/name` label value
pub const RUN_KIND: &str = "bugs-loader";
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

#[derive(Debug, Clone)]
pub struct OrchestrationRun {
    pub concurrency: i64,
    pub release: String,
    pub namespace: String,
    pub skip_on_error: bool,
    pub dry_run: bool,
    pub max_in_flight: usize,
    pub image: String,
    pub active_deadline: Duration,
    pub completion_timeout: Duration,
    pub poll_interval: Duration,
}

impl OrchestrationRun {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            concurrency: config.run.concurrency,
            release: config.run.release.clone(),
            namespace: config.run.namespace.clone(),
            skip_on_error: config.run.skip_on_error,
            dry_run: config.run.dry_run,
            max_in_flight: config.run.max_in_flight.max(1),
            image: config.unit.image.clone(),
            active_deadline: Duration::from_secs(config.unit.active_deadline_secs),
            completion_timeout: Duration::from_secs(config.unit.completion_timeout_secs),
            poll_interval: Duration::from_millis(config.unit.poll_interval_ms),
        }
    }

    /// Labels carried by every resource created for the chunk at `index`.
    pub fn labels(&self, index: usize) -> BTreeMap<String, String> {
        BTreeMap::from([
            (NAME_LABEL.to_string(), RUN_KIND.to_string()),
            (INSTANCE_LABEL.to_string(), index.to_string()),
        ])
    }

    /// Selector matching every resource of this run, whatever its chunk index.
    pub fn selector(&self) -> LabelSelector {
        LabelSelector::new().with(NAME_LABEL, RUN_KIND)
    }
}

impl Default for OrchestrationRun {
    fn default() -> Self {
        Self::from_config(&LoaderConfig::default())
    }
}
