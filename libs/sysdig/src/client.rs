//! Sysdig Monitor data API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetricsError;
use crate::MetricsSource;

/// Connection settings for the Sysdig API.
#[derive(Clone)]
pub struct SysdigConfig {
    /// API base URL (example: https://api.sysdigcloud.com/).
    pub base_url: String,

    /// API token.
    pub token: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl SysdigConfig {
    pub const DEFAULT_URL: &'static str = "https://api.sysdigcloud.com/";

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_URL.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for SysdigConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysdigConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client for `POST api/data`.
#[derive(Debug, Clone)]
pub struct SysdigClient {
    client: reqwest::Client,
    base_url: String,
}

impl SysdigClient {
    /// Create a new client.
    pub fn new(config: &SysdigConfig) -> Result<Self, MetricsError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| MetricsError::Config("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataRequest<'a> {
    metrics: [MetricSpec<'a>; 1],
    data_source_type: &'static str,
    last: u64,
    sampling: u64,
    filter: String,
}

#[derive(Debug, Serialize)]
struct MetricSpec<'a> {
    id: &'a str,
    aggregations: Aggregations,
}

#[derive(Debug, Serialize)]
struct Aggregations {
    time: &'static str,
    group: &'static str,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    data: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    #[serde(default)]
    d: Vec<f64>,
}

impl<'a> DataRequest<'a> {
    /// One averaged sample of `metric` over the trailing window, scoped to a host.
    fn host_average(metric: &'a str, host: &str, window: Duration) -> Self {
        let secs = window.as_secs().max(1);
        Self {
            metrics: [MetricSpec {
                id: metric,
                aggregations: Aggregations {
                    time: "timeAvg",
                    group: "avg",
                },
            }],
            data_source_type: "host",
            last: secs,
            sampling: secs,
            filter: format!("host.hostName = '{host}'"),
        }
    }
}

#[async_trait]
impl MetricsSource for SysdigClient {
    async fn query_host_metric(
        &self,
        metric: &str,
        host: &str,
        window: Duration,
    ) -> Result<f64, MetricsError> {
        let request = DataRequest::host_average(metric, host, window);

        let response = self
            .client
            .post(format!("{}/api/data", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let data: DataResponse = serde_json::from_slice(&body)?;
        let value = data
            .data
            .first()
            .and_then(|sample| sample.d.first())
            .copied()
            .ok_or(MetricsError::NoData)?;

        debug!(metric, host, value, "Fetched host metric");
        Ok(value)
    }
}
