//! Kubernetes backend
//!
//! [`ClusterBackend`] over the Kubernetes REST API: configuration resources are
//! ConfigMaps, execution units are batch/v1 Jobs.

use super::kubeconfig::ClusterConnection;
use super::{ClusterBackend, ConfigResource, ExecutionUnitSpec, LabelSelector, UnitOutcome};
use crate::error::{BackendError, LoadError, ResourceKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONTAINER_NAME: &str = "bugs-loader";
const SCRIPT_FILE_MODE: u32 = 0o755;

fn map_http_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout(format!("request: {}", error))
    } else if error.is_connect() {
        BackendError::Transport(format!("Connection error: {}", error))
    } else if error.is_decode() {
        BackendError::Decode(error.to_string())
    } else {
        BackendError::Transport(error.to_string())
    }
}

/// Error for a non-success API response.
pub fn status_error(status: StatusCode, kind: ResourceKind, name: &str, body: String) -> BackendError {
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound {
            kind,
            name: name.to_string(),
        },
        StatusCode::CONFLICT => BackendError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        _ => BackendError::Rejected(format!("{} {} returned {}: {}", kind, name, status, body)),
    }
}

async fn check_status(
    response: Response,
    kind: ResourceKind,
    name: &str,
) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(status_error(status, kind, name, body))
}

/// ConfigMap manifest for a configuration resource
pub fn config_map_manifest(config: &ConfigResource) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": config.name,
            "labels": config.labels,
        },
        "data": config.data,
    })
}

/// Job manifest for an execution unit
pub fn job_manifest(unit: &ExecutionUnitSpec) -> Value {
    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": unit.name,
            "labels": unit.labels,
        },
        "spec": {
            "parallelism": unit.parallelism,
            "activeDeadlineSeconds": unit.active_deadline.as_secs(),
            "backoffLimit": unit.backoff_limit,
            "template": {
                "metadata": { "labels": unit.labels },
                "spec": {
                    "restartPolicy": "Never",
                    "volumes": [{
                        "name": unit.config_name,
                        "configMap": {
                            "name": unit.config_name,
                            "defaultMode": SCRIPT_FILE_MODE,
                        },
                    }],
                    "containers": [{
                        "name": CONTAINER_NAME,
                        "image": unit.image,
                        "imagePullPolicy": "IfNotPresent",
                        "command": unit.command,
                        "volumeMounts": [{
                            "name": unit.config_name,
                            "mountPath": unit.script_path,
                            "subPath": unit.script_key,
                        }],
                        "securityContext": {
                            "runAsUser": 0,
                            "readOnlyRootFilesystem": false,
                        },
                    }],
                },
            },
        },
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub succeeded: Option<i32>,
    #[serde(default)]
    pub failed: Option<i32>,
    #[serde(default)]
    pub conditions: Vec<JobCondition>,
}

#[derive(Debug, Deserialize)]
pub struct JobCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobObject {
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Terminal outcome of a job, or `None` while it is still running.
pub fn job_outcome(status: &JobStatus) -> Option<UnitOutcome> {
    for condition in status.conditions.iter().filter(|c| c.status == "True") {
        match condition.type_.as_str() {
            "Complete" => return Some(UnitOutcome::Succeeded),
            "Failed" if condition.reason.as_deref() == Some("DeadlineExceeded") => {
                return Some(UnitOutcome::DeadlineExceeded)
            }
            "Failed" => {
                return Some(UnitOutcome::Failed {
                    reason: condition
                        .reason
                        .clone()
                        .or_else(|| condition.message.clone())
                        .unwrap_or_else(|| "Failed".to_string()),
                })
            }
            _ => {}
        }
    }
    if status.succeeded.unwrap_or(0) > 0 {
        return Some(UnitOutcome::Succeeded);
    }
    if status.failed.unwrap_or(0) > 0 {
        return Some(UnitOutcome::Failed {
            reason: "pod failed".to_string(),
        });
    }
    None
}

/// Cluster backend speaking to a Kubernetes API server
pub struct KubernetesBackend {
    client: Client,
    server: String,
    token: Option<String>,
    poll_interval: Duration,
}

impl KubernetesBackend {
    pub fn new(
        connection: &ClusterConnection,
        request_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, LoadError> {
        let mut builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout);
        if let Some(pem) = &connection.ca_pem {
            let certificate = reqwest::Certificate::from_pem(pem)
                .map_err(|e| LoadError::ConfigError(format!("Invalid cluster CA: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(pem) = &connection.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| LoadError::ConfigError(format!("Invalid client certificate: {}", e)))?;
            // PEM identities (PKCS#1, PKCS#8 and EC keys) are only accepted by rustls.
            builder = builder.use_rustls_tls().identity(identity);
        }
        if connection.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| LoadError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: connection.server.clone(),
            token: connection.token.clone(),
            poll_interval,
        })
    }

    fn config_maps_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/configmaps", self.server, namespace)
    }

    fn jobs_url(&self, namespace: &str) -> String {
        format!("{}/apis/batch/v1/namespaces/{}/jobs", self.server, namespace)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn create(
        &self,
        url: String,
        body: Value,
        kind: ResourceKind,
        name: &str,
    ) -> Result<(), BackendError> {
        debug!(%kind, name, "Creating resource");
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;
        check_status(response, kind, name).await.map(|_| ())
    }

    async fn delete(&self, url: String, kind: ResourceKind, name: &str) -> Result<(), BackendError> {
        debug!(%kind, name, "Deleting resource");
        let response = self
            .authorize(self.client.delete(url))
            .json(&json!({
                "apiVersion": "v1",
                "kind": "DeleteOptions",
                "propagationPolicy": "Background",
            }))
            .send()
            .await
            .map_err(map_http_error)?;
        check_status(response, kind, name).await.map(|_| ())
    }

    async fn list(
        &self,
        url: String,
        selector: &LabelSelector,
        kind: ResourceKind,
    ) -> Result<Vec<String>, BackendError> {
        let response = self
            .authorize(self.client.get(url))
            .query(&[("labelSelector", selector.to_query())])
            .send()
            .await
            .map_err(map_http_error)?;
        let list: ObjectList = check_status(response, kind, &selector.to_query())
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
    }

    async fn job_status(&self, namespace: &str, name: &str) -> Result<JobStatus, BackendError> {
        let url = format!("{}/{}", self.jobs_url(namespace), name);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(map_http_error)?;
        let job: JobObject = check_status(response, ResourceKind::ExecutionUnit, name)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(job.status)
    }
}

#[async_trait]
impl ClusterBackend for KubernetesBackend {
    async fn create_config(
        &self,
        namespace: &str,
        config: &ConfigResource,
    ) -> Result<(), BackendError> {
        self.create(
            self.config_maps_url(namespace),
            config_map_manifest(config),
            ResourceKind::Config,
            &config.name,
        )
        .await
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        let url = format!("{}/{}", self.config_maps_url(namespace), name);
        self.delete(url, ResourceKind::Config, name).await
    }

    async fn list_configs(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError> {
        self.list(self.config_maps_url(namespace), selector, ResourceKind::Config)
            .await
    }

    async fn create_unit(
        &self,
        namespace: &str,
        unit: &ExecutionUnitSpec,
    ) -> Result<(), BackendError> {
        self.create(
            self.jobs_url(namespace),
            job_manifest(unit),
            ResourceKind::ExecutionUnit,
            &unit.name,
        )
        .await
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        let url = format!("{}/{}", self.jobs_url(namespace), name);
        self.delete(url, ResourceKind::ExecutionUnit, name).await
    }

    async fn list_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError> {
        self.list(self.jobs_url(namespace), selector, ResourceKind::ExecutionUnit)
            .await
    }

    async fn wait_for_completion(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<UnitOutcome, BackendError> {
        let poll = async {
            loop {
                let status = self.job_status(namespace, name).await?;
                if let Some(outcome) = job_outcome(&status) {
                    return Ok::<_, BackendError>(outcome);
                }
                trace!(name, "Job still running");
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| BackendError::Timeout(format!("job {}", name)))?
    }
}
