//! Scheduler state shared across decision tasks.

use std::sync::Arc;
use std::time::Duration;

use msched_kube::KubeApi;
use msched_sysdig::MetricsSource;

use crate::cache::ExpiringCache;
use crate::candidates::CandidateSupplier;
use crate::ranker::{MetricSelection, NodeRanker};
use crate::stats::SchedulerStats;

/// Settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// `spec.schedulerName` this scheduler answers to.
    pub scheduler_name: String,

    /// Scheduler that deployments are handed to when ranking fails.
    pub fallback_scheduler: String,

    /// Metric to rank nodes by.
    pub selection: MetricSelection,

    /// Trailing window each metric query averages over.
    pub metric_window: Duration,

    /// Lifetime of the Ready node list.
    pub node_cache_ttl: Duration,

    /// Lifetime of the last ranking result.
    pub best_node_cache_ttl: Duration,
}

impl SchedulerSettings {
    pub const DEFAULT_FALLBACK_SCHEDULER: &'static str = "default-scheduler";

    pub fn new(scheduler_name: impl Into<String>, selection: MetricSelection) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
            fallback_scheduler: Self::DEFAULT_FALLBACK_SCHEDULER.to_string(),
            selection,
            metric_window: Duration::from_secs(60),
            node_cache_ttl: Duration::from_secs(15),
            best_node_cache_ttl: Duration::from_secs(15),
        }
    }
}

/// Everything a scheduling decision needs, built once per process.
///
/// The node-list cache is shared between the candidate supplier (which
/// fills it) and the ranker (which checks its cached winner against it).
pub struct SchedulerContext {
    kube: Arc<dyn KubeApi>,
    candidates: CandidateSupplier,
    ranker: NodeRanker,
    stats: Arc<SchedulerStats>,
    scheduler_name: String,
    fallback_scheduler: String,
}

impl SchedulerContext {
    pub fn new(
        kube: Arc<dyn KubeApi>,
        metrics: Arc<dyn MetricsSource>,
        settings: SchedulerSettings,
    ) -> Self {
        let stats = Arc::new(SchedulerStats::default());
        let node_list = Arc::new(ExpiringCache::new(settings.node_cache_ttl));

        let candidates =
            CandidateSupplier::new(Arc::clone(&kube), Arc::clone(&node_list), Arc::clone(&stats));
        let ranker = NodeRanker::new(
            metrics,
            settings.selection,
            settings.metric_window,
            node_list,
            settings.best_node_cache_ttl,
            Arc::clone(&stats),
        );

        Self {
            kube,
            candidates,
            ranker,
            stats,
            scheduler_name: settings.scheduler_name,
            fallback_scheduler: settings.fallback_scheduler,
        }
    }

    pub fn kube(&self) -> &dyn KubeApi {
        self.kube.as_ref()
    }

    pub fn candidates(&self) -> &CandidateSupplier {
        &self.candidates
    }

    pub fn ranker(&self) -> &NodeRanker {
        &self.ranker
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn scheduler_name(&self) -> &str {
        &self.scheduler_name
    }

    pub fn fallback_scheduler(&self) -> &str {
        &self.fallback_scheduler
    }
}
