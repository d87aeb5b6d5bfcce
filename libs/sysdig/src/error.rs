//! Error types for metric queries.

use thiserror::Error;

/// Errors that can occur when querying a metric.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Transport failure, including the per-request timeout.
    #[error("metrics transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-200 status.
    #[error("metric data response: {status}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode metric data: {0}")]
    Decode(#[from] serde_json::Error),

    /// The query succeeded but returned no samples.
    #[error("no data found with those parameters")]
    NoData,

    /// The client could not be constructed.
    #[error("invalid metrics configuration: {0}")]
    Config(String),
}
