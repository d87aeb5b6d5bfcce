//! Connection settings for the Kubernetes API server.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::KubeError;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// How to reach and authenticate against the API server.
#[derive(Clone)]
pub struct KubeConfig {
    /// Base URL of the API server (example: https://10.0.0.1:6443).
    pub api_url: String,

    /// Bearer token sent with every request.
    pub token: Option<String>,

    /// Extra PEM-encoded CA bundle trusted for the API server certificate.
    pub ca_pem: Option<Vec<u8>>,

    /// PEM-encoded client certificate followed by its private key.
    pub identity_pem: Option<Vec<u8>>,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Response timeout for non-watch requests.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_pem", &self.ca_pem.is_some())
            .field("identity_pem", &self.identity_pem.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl KubeConfig {
    /// Unauthenticated settings for the given API URL (e.g. behind `kubectl proxy`).
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
            ca_pem: None,
            identity_pem: None,
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Settings discovered from the pod's service account.
    pub fn in_cluster() -> Result<Self, KubeError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            KubeError::Config("KUBERNETES_SERVICE_HOST is not set; not running in a cluster".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        // IPv6 service hosts need brackets in URLs
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        Self::new(format!("https://{host}:{port}"))
            .with_token_file(dir.join("token"))?
            .with_ca_file(dir.join("ca.crt"))
    }

    /// Read the bearer token from a file.
    pub fn with_token_file(mut self, path: impl AsRef<Path>) -> Result<Self, KubeError> {
        let token = read(path.as_ref())?;
        let token = String::from_utf8_lossy(&token).trim().to_string();
        if token.is_empty() {
            return Err(KubeError::Config(format!(
                "token file {} is empty",
                path.as_ref().display()
            )));
        }
        self.token = Some(token);
        Ok(self)
    }

    /// Trust the CA bundle in the given PEM file.
    pub fn with_ca_file(mut self, path: impl AsRef<Path>) -> Result<Self, KubeError> {
        self.ca_pem = Some(read(path.as_ref())?);
        Ok(self)
    }

    /// Authenticate with a client certificate and key, both PEM files.
    pub fn with_client_identity(
        mut self,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Result<Self, KubeError> {
        let mut pem = read(cert.as_ref())?;
        pem.push(b'\n');
        pem.extend(read(key.as_ref())?);
        self.identity_pem = Some(pem);
        Ok(self)
    }
}

pub(crate) fn read(path: &Path) -> Result<Vec<u8>, KubeError> {
    fs::read(path).map_err(|e| KubeError::Config(format!("failed to read {}: {e}", path.display())))
}
