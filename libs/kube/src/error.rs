//! Error types for the Kubernetes gateway.

use thiserror::Error;

/// Errors returned by Kubernetes API operations.
#[derive(Debug, Error)]
pub enum KubeError {
    /// Transport failure (connect, timeout, TLS, body read).
    #[error("kubernetes transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("failed to decode kubernetes response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API server answered with a non-success status.
    #[error("kubernetes API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The watch body could not be read.
    #[error("failed to read watch stream: {0}")]
    WatchRead(#[source] std::io::Error),

    /// A watch record exceeded the framing limit.
    #[error("watch record exceeds {limit} bytes")]
    WatchLineTooLong { limit: usize },

    /// A kubeconfig file could not be parsed.
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] serde_yaml::Error),

    /// Connection settings are incomplete or unreadable.
    #[error("invalid kubernetes configuration: {0}")]
    Config(String),
}

