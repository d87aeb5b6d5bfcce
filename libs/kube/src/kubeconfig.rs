//! Connection settings read from a kubeconfig file.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use directories::BaseDirs;
use serde::Deserialize;

use crate::config::{read, KubeConfig};
use crate::error::KubeError;

#[derive(Debug, Default, Deserialize)]
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
    certificate_authority_data: Option<String>,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
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
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key_data: Option<String>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_key: Option<PathBuf>,
}

impl KubeConfig {
    /// `~/.kube/config`, when a home directory can be determined.
    pub fn default_kubeconfig_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(".kube").join("config"))
    }

    /// Settings for the current context of a kubeconfig file.
    ///
    /// Relative certificate paths resolve against the file's directory.
    pub fn from_kubeconfig(path: impl AsRef<Path>) -> Result<Self, KubeError> {
        let path = path.as_ref();
        let contents = read(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_kubeconfig_bytes(&contents, base)
    }

    /// Like [`KubeConfig::from_kubeconfig`], for contents already in memory.
    pub fn from_kubeconfig_bytes(contents: &[u8], base: &Path) -> Result<Self, KubeError> {
        let file: Kubeconfig = serde_yaml::from_slice(contents)?;

        let context = match file.current_context.as_deref().filter(|c| !c.is_empty()) {
            Some(name) => file
                .contexts
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| KubeError::Config(format!("context {name} not found in kubeconfig")))?,
            None => file
                .contexts
                .first()
                .ok_or_else(|| KubeError::Config("kubeconfig has no contexts".into()))?,
        };

        let cluster_name = &context.context.cluster;
        let cluster = file
            .clusters
            .iter()
            .find(|c| &c.name == cluster_name)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                KubeError::Config(format!("cluster {cluster_name} not found in kubeconfig"))
            })?;

        let mut config = Self::new(cluster.server.as_str());

        if let Some(data) = &cluster.certificate_authority_data {
            config.ca_pem = Some(decode(data, "certificate-authority-data", cluster_name)?);
        } else if let Some(path) = &cluster.certificate_authority {
            config = config.with_ca_file(base.join(path))?;
        }

        let Some(user_name) = context.context.user.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(config);
        };
        let user = file
            .users
            .iter()
            .find(|u| u.name == user_name)
            .map(|u| &u.user)
            .ok_or_else(|| KubeError::Config(format!("user {user_name} not found in kubeconfig")))?;

        config.token = user.token.clone().filter(|t| !t.is_empty());

        match (&user.client_certificate_data, &user.client_key_data) {
            (Some(cert), Some(key)) => {
                let mut pem = decode(cert, "client-certificate-data", user_name)?;
                pem.push(b'\n');
                pem.extend(decode(key, "client-key-data", user_name)?);
                config.identity_pem = Some(pem);
            }
            (None, None) => {
                if let (Some(cert), Some(key)) = (&user.client_certificate, &user.client_key) {
                    config = config.with_client_identity(base.join(cert), base.join(key))?;
                }
            }
            _ => {
                return Err(KubeError::Config(format!(
                    "user {user_name} needs both client-certificate-data and client-key-data"
                )))
            }
        }

        Ok(config)
    }
}

fn decode(data: &str, field: &str, owner: &str) -> Result<Vec<u8>, KubeError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| KubeError::Config(format!("{field} of {owner} is not valid base64: {e}")))
}
