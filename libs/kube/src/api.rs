//! The Kubernetes operations the scheduler consumes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::KubeError;
use crate::types::{Deployment, Node, Status};

/// Raw watch records, one JSON document per item.
pub type WatchStream = BoxStream<'static, Result<Bytes, KubeError>>;

/// Kubernetes API interface.
#[async_trait]
pub trait KubeApi: Send + Sync {
    /// List every node in the cluster.
    async fn list_nodes(&self) -> Result<Vec<Node>, KubeError>;

    /// Open a watch on pods in all namespaces, optionally resuming from a
    /// resource version.
    async fn watch_pods(&self, resource_version: Option<&str>) -> Result<WatchStream, KubeError>;

    /// Bind a pod to a node. The returned status carries the API's verdict.
    async fn bind(&self, namespace: &str, pod: &str, node: &str) -> Result<Status, KubeError>;

    /// List deployments in a namespace matching a field selector.
    async fn list_deployments(
        &self,
        namespace: &str,
        field_selector: &str,
    ) -> Result<Vec<Deployment>, KubeError>;

    /// Rewrite the scheduler name of a deployment's pod template.
    async fn update_deployment_scheduler_name(
        &self,
        deployment: &Deployment,
        scheduler_name: &str,
    ) -> Result<Status, KubeError>;
}
