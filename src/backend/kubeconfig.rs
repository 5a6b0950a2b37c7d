//! Kubeconfig resolution
//!
//! Finds the API server address and credentials for [`super::KubernetesBackend`].
//! Lookup order: explicit path, `$KUBECONFIG` (first entry), in-cluster service
//! account, `~/.kube/config`. Supports bearer tokens, client certificates and CA
//! bundles, each either inline (base64) or as a file next to the kubeconfig.

use crate::error::LoadError;
use base64::Engine as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved connection parameters for one cluster
#[derive(Clone)]
pub struct ClusterConnection {
    /// API server base URL without trailing slash
    pub server: String,
    pub token: Option<String>,
    /// PEM bundle to trust in addition to the system roots
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate chain followed by its private key, PEM encoded
    pub identity_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    /// Namespace of the selected context, if any
    pub namespace: Option<String>,
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .field("identity_pem", &self.identity_pem.as_ref().map(|_| "<redacted>"))
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: AuthInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AuthInfo {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, alias = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

fn config_error(message: impl Into<String>) -> LoadError {
    LoadError::ConfigError(message.into())
}

/// Bytes of a `<field>-data` (base64) value, else of the `<field>` file.
fn inline_or_file(
    data: Option<&str>,
    path: Option<PathBuf>,
    field: &str,
) -> Result<Option<Vec<u8>>, LoadError> {
    if let Some(data) = data {
        return base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map(Some)
            .map_err(|e| config_error(format!("Invalid {}-data: {}", field, e)));
    }
    path.map(|path| {
        std::fs::read(&path)
            .map_err(|e| config_error(format!("Failed to read {} {}: {}", field, path.display(), e)))
    })
    .transpose()
}

fn token(
    auth: &AuthInfo,
    resolve: &dyn Fn(&PathBuf) -> PathBuf,
) -> Result<Option<String>, LoadError> {
    if let Some(token) = &auth.token {
        return Ok(Some(token.clone()));
    }
    auth.token_file
        .as_ref()
        .map(|path| {
            let path = resolve(path);
            std::fs::read_to_string(&path)
                .map(|token| token.trim().to_string())
                .map_err(|e| config_error(format!("Failed to read token {}: {}", path.display(), e)))
        })
        .transpose()
}

/// Certificate and key concatenated, or `None` when the user has no certificate.
fn identity(
    auth: &AuthInfo,
    resolve: &dyn Fn(&PathBuf) -> PathBuf,
) -> Result<Option<Vec<u8>>, LoadError> {
    let certificate = inline_or_file(
        auth.client_certificate_data.as_deref(),
        auth.client_certificate.as_ref().map(resolve),
        "client-certificate",
    )?;
    let key = inline_or_file(
        auth.client_key_data.as_deref(),
        auth.client_key.as_ref().map(resolve),
        "client-key",
    )?;

    match (certificate, key) {
        (Some(mut pem), Some(key)) => {
            if !pem.ends_with(b"\n") {
                pem.push(b'\n');
            }
            pem.extend_from_slice(&key);
            Ok(Some(pem))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(config_error("client-certificate given without client-key")),
        (None, Some(_)) => Err(config_error("client-key given without client-certificate")),
    }
}

impl ClusterConnection {
    /// Resolve a connection using the lookup order described in the module docs.
    pub fn resolve(kubeconfig: Option<&Path>) -> Result<Self, LoadError> {
        if let Some(path) = kubeconfig {
            return Self::from_kubeconfig_file(path);
        }

        if let Some(path) = std::env::var_os("KUBECONFIG")
            .and_then(|value| std::env::split_paths(&value).next())
            .filter(|p| !p.as_os_str().is_empty())
        {
            return Self::from_kubeconfig_file(&path);
        }

        if let Some(connection) = Self::in_cluster()? {
            return Ok(connection);
        }

        let home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".kube").join("config"))
            .ok_or_else(|| config_error("Cannot locate home directory for ~/.kube/config"))?;
        Self::from_kubeconfig_file(&home)
    }

    pub fn from_kubeconfig_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("Failed to read kubeconfig {}: {}", path.display(), e))
        })?;
        debug!(kubeconfig = %path.display(), "Using kubeconfig");
        Self::from_kubeconfig_str(&text, path.parent())
    }

    /// Parse kubeconfig text. Relative file references resolve against `base_dir`.
    pub fn from_kubeconfig_str(text: &str, base_dir: Option<&Path>) -> Result<Self, LoadError> {
        let kubeconfig: Kubeconfig = serde_yaml::from_str(text)
            .map_err(|e| config_error(format!("Malformed kubeconfig: {}", e)))?;

        let context_name = kubeconfig
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| config_error("kubeconfig has no current-context"))?;
        let context = &kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .ok_or_else(|| config_error(format!("Context '{}' not found", context_name)))?
            .context;
        let cluster = &kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .ok_or_else(|| config_error(format!("Cluster '{}' not found", context.cluster)))?
            .cluster;
        let user = match &context.user {
            Some(user_name) => Some(
                &kubeconfig
                    .users
                    .iter()
                    .find(|u| &u.name == user_name)
                    .ok_or_else(|| config_error(format!("User '{}' not found", user_name)))?
                    .user,
            ),
            None => None,
        };

        let resolve = |p: &PathBuf| match base_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p.clone(),
        };

        let ca_pem = inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_ref().map(&resolve),
            "certificate-authority",
        )?;

        let (token, identity_pem) = match user {
            Some(auth) => (token(auth, &resolve)?, identity(auth, &resolve)?),
            None => (None, None),
        };

        Ok(Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            token,
            ca_pem,
            identity_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            namespace: context.namespace.clone(),
        })
    }

    /// Service account credentials when running inside a pod.
    fn in_cluster() -> Result<Option<Self>, LoadError> {
        let (Ok(host), Ok(port)) = (
            std::env::var("KUBERNETES_SERVICE_HOST"),
            std::env::var("KUBERNETES_SERVICE_PORT"),
        ) else {
            return Ok(None);
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))
            .map_err(|e| config_error(format!("Failed to read service account token: {}", e)))?;
        let ca_pem = std::fs::read(dir.join("ca.crt")).ok();
        let namespace = std::fs::read_to_string(dir.join("namespace"))
            .ok()
            .map(|ns| ns.trim().to_string());

        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };
        debug!(%host, %port, "Using in-cluster service account");
        Ok(Some(Self {
            server: format!("https://{}:{}", host, port),
            token: Some(token.trim().to_string()),
            ca_pem,
            identity_pem: None,
            insecure_skip_tls_verify: false,
            namespace,
        }))
    }
}
