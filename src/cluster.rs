//! Kubernetes API client construction.
//!
//! Two ways in: ambient in-cluster service-account credentials, or an
//! explicit kubeconfig file. Both produce [`ClusterCredentials`], which
//! [`ClusterClient::new`] turns into an authenticated HTTP client.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the kubelet mounts the pod's service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Errors resolving credentials or building the client.
#[derive(Debug)]
pub enum CredentialError {
    /// `KUBERNETES_SERVICE_HOST` / `KUBERNETES_SERVICE_PORT` are not set.
    NotInCluster,
    /// A credential file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The kubeconfig is not valid YAML for the expected schema.
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// The kubeconfig has no `current-context`.
    MissingContext,
    UnknownContext(String),
    UnknownCluster(String),
    UnknownUser(String),
    /// The selected cluster entry has no `server`.
    MissingServer(String),
    /// An inline `*-data` field is not valid base64.
    Decode {
        field: &'static str,
        source: base64::DecodeError,
    },
    /// The bearer token cannot be sent as a header value.
    InvalidToken,
    /// The HTTP client rejected the TLS material.
    Client { source: reqwest::Error },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::NotInCluster => write!(
                f,
                "unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined"
            ),
            CredentialError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            CredentialError::Parse { path, source } => {
                write!(f, "invalid kubeconfig {}: {}", path.display(), source)
            }
            CredentialError::MissingContext => write!(f, "kubeconfig has no current-context"),
            CredentialError::UnknownContext(name) => write!(f, "context {name:?} not found"),
            CredentialError::UnknownCluster(name) => write!(f, "cluster {name:?} not found"),
            CredentialError::UnknownUser(name) => write!(f, "user {name:?} not found"),
            CredentialError::MissingServer(name) => {
                write!(f, "cluster {name:?} has no server address")
            }
            CredentialError::Decode { field, source } => {
                write!(f, "failed to decode {field}: {source}")
            }
            CredentialError::InvalidToken => write!(f, "bearer token is not a valid header value"),
            CredentialError::Client { source } => {
                write!(f, "failed to build cluster client: {}", source)
            }
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialError::Read { source, .. } => Some(source),
            CredentialError::Parse { source, .. } => Some(source),
            CredentialError::Decode { source, .. } => Some(source),
            CredentialError::Client { source } => Some(source),
            _ => None,
        }
    }
}

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum ClusterAuth {
    None,
    Token(String),
    ClientCert { cert_pem: Vec<u8>, key_pem: Vec<u8> },
}

impl fmt::Debug for ClusterAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterAuth::None => f.write_str("None"),
            ClusterAuth::Token(_) => f.write_str("Token(<redacted>)"),
            ClusterAuth::ClientCert { .. } => f.write_str("ClientCert(<redacted>)"),
        }
    }
}

/// Everything needed to talk to an API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    /// API server base URL, e.g. `https://10.0.0.1:443`.
    pub server: String,
    /// PEM bundle of trusted CAs.
    pub ca_pem: Option<Vec<u8>>,
    pub auth: ClusterAuth,
    pub insecure_skip_tls_verify: bool,
    pub namespace: Option<String>,
}

impl ClusterCredentials {
    /// Credentials of the pod's service account.
    pub fn in_cluster() -> Result<Self, CredentialError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok();
        let port = std::env::var("KUBERNETES_SERVICE_PORT").ok();
        Self::in_cluster_from(host.as_deref(), port.as_deref(), Path::new(SERVICE_ACCOUNT_DIR))
    }

    fn in_cluster_from(
        host: Option<&str>,
        port: Option<&str>,
        account_dir: &Path,
    ) -> Result<Self, CredentialError> {
        let (Some(host), Some(port)) = (
            host.filter(|h| !h.is_empty()),
            port.filter(|p| !p.is_empty()),
        ) else {
            return Err(CredentialError::NotInCluster);
        };

        let token = read_trimmed(&account_dir.join("token"))?;

        let ca_path = account_dir.join("ca.crt");
        let ca_pem = match std::fs::read(&ca_path) {
            Ok(pem) => Some(pem),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %ca_path.display(),
                    "no service-account CA bundle, using system roots"
                );
                None
            }
        };
        let namespace = read_trimmed(&account_dir.join("namespace")).ok();

        let server = if host.contains(':') {
            format!("https://[{host}]:{port}")
        } else {
            format!("https://{host}:{port}")
        };

        Ok(Self {
            server,
            ca_pem,
            auth: ClusterAuth::Token(token),
            insecure_skip_tls_verify: false,
            namespace,
        })
    }

    /// Credentials for the current context of a kubeconfig file.
    pub fn from_kubeconfig(path: &Path) -> Result<Self, CredentialError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Kubeconfig =
            serde_yaml::from_str(&raw).map_err(|source| CredentialError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve(base)
    }
}

// --- kubeconfig schema (the subset we read) ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Kubeconfig {
    clusters: Vec<NamedCluster>,
    users: Vec<NamedUser>,
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct UserEntry {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextEntry {
    cluster: String,
    user: String,
    namespace: Option<String>,
}

impl Kubeconfig {
    /// Resolve the current context. Relative file references are taken
    /// relative to `base`, the kubeconfig's directory.
    fn resolve(self, base: &Path) -> Result<ClusterCredentials, CredentialError> {
        let current = self
            .current_context
            .filter(|c| !c.is_empty())
            .ok_or(CredentialError::MissingContext)?;
        let context = self
            .contexts
            .into_iter()
            .find(|c| c.name == current)
            .ok_or(CredentialError::UnknownContext(current))?
            .context;

        let cluster = self
            .clusters
            .into_iter()
            .find(|c| c.name == context.cluster)
            .ok_or_else(|| CredentialError::UnknownCluster(context.cluster.clone()))?
            .cluster;
        if cluster.server.is_empty() {
            return Err(CredentialError::MissingServer(context.cluster));
        }

        let user = if context.user.is_empty() {
            UserEntry::default()
        } else {
            self.users
                .into_iter()
                .find(|u| u.name == context.user)
                .ok_or_else(|| CredentialError::UnknownUser(context.user.clone()))?
                .user
        };

        let ca_pem = inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base,
            "certificate-authority-data",
        )?;

        let auth = if let Some(token) = user.token.filter(|t| !t.is_empty()) {
            ClusterAuth::Token(token)
        } else if let Some(file) = user.token_file {
            ClusterAuth::Token(read_trimmed(&relative_to(base, &file))?)
        } else {
            let cert = inline_or_file(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
                base,
                "client-certificate-data",
            )?;
            let key = inline_or_file(
                user.client_key_data.as_deref(),
                user.client_key.as_deref(),
                base,
                "client-key-data",
            )?;
            match (cert, key) {
                (Some(cert_pem), Some(key_pem)) => ClusterAuth::ClientCert { cert_pem, key_pem },
                _ => ClusterAuth::None,
            }
        };

        Ok(ClusterCredentials {
            server: cluster.server,
            ca_pem,
            auth,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            namespace: context.namespace,
        })
    }
}

fn relative_to(base: &Path, file: &Path) -> PathBuf {
    if file.is_relative() {
        base.join(file)
    } else {
        file.to_path_buf()
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, CredentialError> {
    std::fs::read(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_trimmed(path: &Path) -> Result<String, CredentialError> {
    let bytes = read_bytes(path)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Inline base64 data wins over a file reference.
fn inline_or_file(
    data: Option<&str>,
    file: Option<&Path>,
    base: &Path,
    field: &'static str,
) -> Result<Option<Vec<u8>>, CredentialError> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        return STANDARD
            .decode(data.trim())
            .map(Some)
            .map_err(|source| CredentialError::Decode { field, source });
    }
    match file {
        Some(file) => read_bytes(&relative_to(base, file)).map(Some),
        None => Ok(None),
    }
}

/// Every certificate in a PEM CA bundle.
fn root_certificates(pem: &[u8]) -> Result<Vec<reqwest::Certificate>, CredentialError> {
    reqwest::Certificate::from_pem_bundle(pem).map_err(|source| CredentialError::Client { source })
}

/// An authenticated handle on a Kubernetes API server.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
    namespace: Option<String>,
}

impl ClusterClient {
    pub fn new(credentials: ClusterCredentials) -> Result<Self, CredentialError> {
        let client_error = |source| CredentialError::Client { source };
        let mut builder = reqwest::Client::builder();

        if let Some(pem) = &credentials.ca_pem {
            for cert in root_certificates(pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if credentials.insecure_skip_tls_verify {
            tracing::warn!(server = %credentials.server, "TLS verification disabled for cluster API");
            builder = builder.danger_accept_invalid_certs(true);
        }

        match &credentials.auth {
            ClusterAuth::Token(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| CredentialError::InvalidToken)?;
                value.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, value);
                builder = builder.default_headers(headers);
            }
            ClusterAuth::ClientCert { cert_pem, key_pem } => {
                let mut pem = cert_pem.clone();
                pem.push(b'\n');
                pem.extend_from_slice(key_pem);
                let identity = reqwest::Identity::from_pem(&pem).map_err(client_error)?;
                builder = builder.identity(identity);
            }
            ClusterAuth::None => {}
        }

        let http = builder.build().map_err(client_error)?;
        Ok(Self {
            http,
            base_url: credentials.server.trim_end_matches('/').to_string(),
            namespace: credentials.namespace,
        })
    }

    /// Client for the pod's own service account.
    pub fn in_cluster() -> Result<Self, CredentialError> {
        Self::new(ClusterCredentials::in_cluster()?)
    }

    /// Like [`ClusterClient::in_cluster`], but panics on failure.
    ///
    /// For callers that treat missing cluster credentials as fatal at startup.
    pub fn must_in_cluster() -> Self {
        match Self::in_cluster() {
            Ok(client) => client,
            Err(e) => panic!("failed to build in-cluster client: {e}"),
        }
    }

    /// Client for the current context of a kubeconfig file.
    pub fn from_kubeconfig(path: &Path) -> Result<Self, CredentialError> {
        Self::new(ClusterCredentials::from_kubeconfig(path)?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Request builder for `path` on the API server (e.g. `/version`).
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }
}
