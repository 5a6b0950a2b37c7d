//! Error types for the bugs loader.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The two resource kinds a run creates on the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Key/value payload mounted into the unit (a ConfigMap)
    Config,
    /// Bounded, non-retried job running a chunk (a Job)
    ExecutionUnit,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Config => write!(f, "configmap"),
            ResourceKind::ExecutionUnit => write!(f, "job"),
        }
    }
}

/// Backend-level errors returned by a [`crate::backend::ClusterBackend`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Errors surfaced by a load run
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Source not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read source {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse source {origin}: {message}")]
    ParseFailure { origin: String, message: String },

    #[error("Malformed source {origin}: missing top-level key '{key}'")]
    SchemaViolation { origin: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to create {kind} {name}: {source}")]
    ResourceCreateFailure {
        kind: ResourceKind,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to delete {kind} {name}: {source}")]
    ResourceDeleteFailure {
        kind: ResourceKind,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed waiting for job {name}: {source}")]
    CompletionWaitFailure {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for LoadError {
    fn from(err: config::ConfigError) -> Self {
        LoadError::ConfigError(err.to_string())
    }
}
