//! Configuration System
//!
//! Layered configuration for a load run: merge-policy defaults, a global file, workspace
//! files and `BUGS_LOADER_*` environment overrides, deserialized into [`LoaderConfig`]
//! and validated before a run is built from it.

use crate::logging::{self, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub unit: UnitConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            unit: UnitConfig::default(),
            cluster: ClusterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// What to load and how to split it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// YAML document with the `bugs` list
    pub source: PathBuf,
    /// Number of chunks to split the list into; validated by the partitioner
    pub concurrency: i64,
    /// Helm release name of the vulas deployment receiving uploads
    pub release: String,
    pub namespace: String,
    /// Pass `-sie` so already-known vulnerabilities are skipped
    pub skip_on_error: bool,
    /// When false, pass `-u` so analysis results are uploaded
    pub dry_run: bool,
    /// Chunks submitted and awaited at the same time
    pub max_in_flight: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("bugs.yaml"),
            concurrency: 1,
            release: "vulas-".to_string(),
            namespace: "vulnerability-assessment-tool-core".to_string(),
            skip_on_error: false,
            dry_run: true,
            max_in_flight: 1,
        }
    }
}

/// Job template settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub image: String,
    /// Hard runtime limit of one job
    pub active_deadline_secs: u64,
    /// How long the dispatcher waits for a job before giving up
    pub completion_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            image: "ichbinfrog/patchanalyzer:v0.0.1".to_string(),
            active_deadline_secs: 100,
            completion_timeout_secs: 600,
            poll_interval_ms: 2000,
        }
    }
}

/// Cluster connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Explicit kubeconfig; falls back to $KUBECONFIG, in-cluster, then ~/.kube/config
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            request_timeout_secs: 30,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Run(String),
    Unit(String),
    Cluster(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Run(msg) => write!(f, "run: {}", msg),
            ValidationError::Unit(msg) => write!(f, "unit: {}", msg),
            ValidationError::Cluster(msg) => write!(f, "cluster: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LoaderConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.run.source.as_os_str().is_empty() {
            errors.push(ValidationError::Run("source cannot be empty".to_string()));
        }
        if self.run.release.trim().is_empty() {
            errors.push(ValidationError::Run("release cannot be empty".to_string()));
        }
        if self.run.namespace.trim().is_empty() {
            errors.push(ValidationError::Run("namespace cannot be empty".to_string()));
        }
        if self.run.max_in_flight == 0 {
            errors.push(ValidationError::Run(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        if self.unit.image.trim().is_empty() {
            errors.push(ValidationError::Unit("image cannot be empty".to_string()));
        }
        if self.unit.active_deadline_secs == 0 {
            errors.push(ValidationError::Unit(
                "active_deadline_secs must be positive".to_string(),
            ));
        }
        if self.unit.completion_timeout_secs == 0 {
            errors.push(ValidationError::Unit(
                "completion_timeout_secs must be positive".to_string(),
            ));
        }
        if self.unit.completion_timeout_secs <= self.unit.active_deadline_secs {
            errors.push(ValidationError::Unit(format!(
                "completion_timeout_secs ({}) must exceed active_deadline_secs ({})",
                self.unit.completion_timeout_secs, self.unit.active_deadline_secs
            )));
        }
        if self.unit.poll_interval_ms == 0 {
            errors.push(ValidationError::Unit(
                "poll_interval_ms must be positive".to_string(),
            ));
        }

        if self.cluster.request_timeout_secs == 0 {
            errors.push(ValidationError::Cluster(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        if let Err(e) = logging::validate(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
