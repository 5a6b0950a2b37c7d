//! Cluster Backend Abstraction
//!
//! Capability interface over the orchestration backend that stores configuration
//! resources and runs execution units. The dispatcher and sweeper only talk to
//! [`ClusterBackend`]; [`KubernetesBackend`] speaks the Kubernetes REST API and
//! [`InMemoryBackend`] keeps everything in process.

use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub mod kube;
pub mod kubeconfig;
pub mod memory;

pub use kube::KubernetesBackend;
pub use memory::InMemoryBackend;

/// Equality-based label selector (`k1=v1,k2=v2`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// True when every requirement is present in `labels`. An empty selector matches everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn to_query(&self) -> String {
        self.requirements
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

/// Key/value payload mounted into an execution unit (ConfigMap)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResource {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

/// Bounded, non-retried job running one chunk (Job)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnitSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Configuration resource mounted into the container
    pub config_name: String,
    /// Key of the script inside the configuration resource
    pub script_key: String,
    /// Absolute path the script is mounted at
    pub script_path: String,
    pub image: String,
    pub command: Vec<String>,
    pub active_deadline: Duration,
    pub backoff_limit: u32,
    pub parallelism: u32,
}

/// Terminal state of an execution unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOutcome {
    Succeeded,
    Failed { reason: String },
    DeadlineExceeded,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Succeeded)
    }
}

/// Operations the loader needs from the cluster
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn create_config(
        &self,
        namespace: &str,
        config: &ConfigResource,
    ) -> Result<(), BackendError>;

    /// Deleting an absent resource returns [`BackendError::NotFound`].
    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), BackendError>;

    /// Names of configuration resources matching `selector`
    async fn list_configs(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError>;

    async fn create_unit(&self, namespace: &str, unit: &ExecutionUnitSpec)
        -> Result<(), BackendError>;

    /// Deleting an absent resource returns [`BackendError::NotFound`].
    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), BackendError>;

    /// Names of execution units matching `selector`
    async fn list_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError>;

    /// Block until the unit reaches a terminal state or `timeout` elapses.
    async fn wait_for_completion(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<UnitOutcome, BackendError>;
}
