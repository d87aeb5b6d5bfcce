//! # msched-sysdig
//!
//! Queries a single aggregated value of a Sysdig Monitor metric for one host.
//!
//! The scheduler depends on [`MetricsSource`]; [`SysdigClient`] implements it
//! against the `api/data` endpoint.

mod client;
mod error;

use std::time::Duration;

use async_trait::async_trait;

pub use client::{SysdigClient, SysdigConfig};
pub use error::MetricsError;

/// Source of per-host metric values.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Average of `metric` for `host` over the trailing `window`.
    async fn query_host_metric(
        &self,
        metric: &str,
        host: &str,
        window: Duration,
    ) -> Result<f64, MetricsError>;
}
