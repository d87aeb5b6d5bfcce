//! Candidate node supplier.
//!
//! Produces the names of the nodes currently reporting `Ready`, served from
//! the node-list cache when it is fresh.

use std::sync::Arc;

use msched_kube::KubeApi;
use tracing::{debug, warn};

use crate::cache::ExpiringCache;
use crate::stats::SchedulerStats;

/// Supplies the Candidate Set for ranking.
pub struct CandidateSupplier {
    kube: Arc<dyn KubeApi>,
    cache: Arc<ExpiringCache<Vec<String>>>,
    stats: Arc<SchedulerStats>,
}

impl CandidateSupplier {
    pub fn new(
        kube: Arc<dyn KubeApi>,
        cache: Arc<ExpiringCache<Vec<String>>>,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        Self { kube, cache, stats }
    }

    /// Names of the Ready nodes.
    ///
    /// A failed listing yields an empty set, which downstream ranking turns
    /// into a fallback. The failure is logged and counted in
    /// `node_list_failures` and is not cached, so the next call retries.
    pub async fn candidates(&self) -> Vec<String> {
        if let Some(nodes) = self.cache.get() {
            debug!(node_count = nodes.len(), "Using cached node list");
            return nodes;
        }

        let nodes = match self.kube.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                SchedulerStats::incr(&self.stats.node_list_failures);
                warn!(error = %e, "Failed to list nodes, no candidates available");
                return Vec::new();
            }
        };

        let total = nodes.len();
        let ready: Vec<String> = nodes
            .into_iter()
            .filter(|node| node.is_ready())
            .map(|node| node.metadata.name)
            .collect();

        debug!(total, ready = ready.len(), "Refreshed node list");
        self.cache.set(ready.clone());
        ready
    }
}
