//! Node ranking by a live metric.
//!
//! For a Candidate Set the ranker queries the metrics backend once per node,
//! concurrently, waits for every query to settle and keeps the node with the
//! extremal value. The winner is cached together with the set that produced
//! it; a cached winner is reused only while both that set and the current
//! node-list cache match the requested candidates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use msched_sysdig::{MetricsError, MetricsSource};
use tracing::{debug, info, instrument, warn};

use crate::cache::ExpiringCache;
use crate::stats::SchedulerStats;

/// Errors that end a ranking without a winner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error("node list must contain at least one element")]
    EmptyCandidateSet,

    #[error("no node found")]
    NoNodeFound,
}

/// Which end of the metric range wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOrder {
    LowerIsBetter,
    HigherIsBetter,
}

impl MetricOrder {
    fn prefers(self, candidate: f64, current: f64) -> bool {
        match self {
            MetricOrder::LowerIsBetter => candidate < current,
            MetricOrder::HigherIsBetter => candidate > current,
        }
    }
}

impl fmt::Display for MetricOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricOrder::LowerIsBetter => f.write_str("lower"),
            MetricOrder::HigherIsBetter => f.write_str("higher"),
        }
    }
}

/// The metric to rank by and its direction.
///
/// Parsed from `[+|-]metric.id`: `+` ranks higher values first, `-` or no
/// prefix ranks lower values first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelection {
    pub metric: String,
    pub order: MetricOrder,
}

impl FromStr for MetricSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (metric, order) = match s.as_bytes().first() {
            Some(b'+') => (&s[1..], MetricOrder::HigherIsBetter),
            Some(b'-') => (&s[1..], MetricOrder::LowerIsBetter),
            _ => (s, MetricOrder::LowerIsBetter),
        };

        if metric.is_empty() {
            return Err("metric name must not be empty".to_string());
        }

        Ok(Self {
            metric: metric.to_string(),
            order,
        })
    }
}

/// The node judged best, with the value that won.
#[derive(Debug, Clone, PartialEq)]
pub struct BestNode {
    pub name: String,
    pub value: f64,
}

/// Outcome of querying one candidate.
#[derive(Debug)]
pub struct NodeMeasurement {
    pub name: String,
    pub value: Result<f64, MetricsError>,
}

#[derive(Debug, Clone)]
struct RankedSet {
    candidates: Vec<String>,
    best: BestNode,
}

/// Ranks candidate nodes by the configured metric.
pub struct NodeRanker {
    metrics: Arc<dyn MetricsSource>,
    selection: MetricSelection,
    window: Duration,
    node_list: Arc<ExpiringCache<Vec<String>>>,
    best_node: ExpiringCache<RankedSet>,
    stats: Arc<SchedulerStats>,
}

impl NodeRanker {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        selection: MetricSelection,
        window: Duration,
        node_list: Arc<ExpiringCache<Vec<String>>>,
        best_node_ttl: Duration,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        Self {
            metrics,
            selection,
            window,
            node_list,
            best_node: ExpiringCache::new(best_node_ttl),
            stats,
        }
    }

    pub fn selection(&self) -> &MetricSelection {
        &self.selection
    }

    /// Pick the best of `candidates`.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len(), metric = %self.selection.metric))]
    pub async fn best_node(&self, candidates: &[String]) -> Result<BestNode, RankError> {
        if candidates.is_empty() {
            return Err(RankError::EmptyCandidateSet);
        }

        if let Some(best) = self.cached(candidates) {
            SchedulerStats::incr(&self.stats.rank_cache_hits);
            debug!(node = %best.name, value = best.value, "Using cached best node");
            return Ok(best);
        }
        SchedulerStats::incr(&self.stats.rank_cache_misses);

        let measurements = self.measure(candidates).await;

        for failed in measurements.iter().filter(|m| m.value.is_err()) {
            if let Err(e) = &failed.value {
                SchedulerStats::incr(&self.stats.metric_query_failures);
                warn!(node = %failed.name, error = %e, "Error retrieving node metric");
            }
        }

        let best = select_best(&measurements, self.selection.order).ok_or(RankError::NoNodeFound)?;
        info!(node = %best.name, value = best.value, "Best node found");

        self.best_node.set(RankedSet {
            candidates: candidates.to_vec(),
            best: best.clone(),
        });
        Ok(best)
    }

    fn cached(&self, candidates: &[String]) -> Option<BestNode> {
        let ranked = self.best_node.get()?;
        let nodes = self.node_list.get()?;

        (same_members(&nodes, candidates) && same_members(&ranked.candidates, candidates))
            .then_some(ranked.best)
    }

    /// Query every candidate concurrently. Results keep candidate order.
    async fn measure(&self, candidates: &[String]) -> Vec<NodeMeasurement> {
        let queries = candidates.iter().map(|name| async move {
            let value = self
                .metrics
                .query_host_metric(&self.selection.metric, short_host_name(name), self.window)
                .await;
            NodeMeasurement {
                name: name.clone(),
                value,
            }
        });

        join_all(queries).await
    }
}

/// Reduce measurements to the extremal successful value.
///
/// Failed and NaN measurements are skipped. Ties go to the earliest
/// measurement, which is candidate order.
pub fn select_best(measurements: &[NodeMeasurement], order: MetricOrder) -> Option<BestNode> {
    let mut best: Option<BestNode> = None;

    for measurement in measurements {
        let Ok(value) = &measurement.value else {
            continue;
        };
        let value = *value;
        if value.is_nan() {
            continue;
        }

        let improves = best
            .as_ref()
            .map_or(true, |current| order.prefers(value, current.value));
        if improves {
            best = Some(BestNode {
                name: measurement.name.clone(),
                value,
            });
        }
    }

    best
}

/// Host identifier used by the metrics backend: the node name up to the first dot.
pub fn short_host_name(node: &str) -> &str {
    node.split('.').next().unwrap_or(node)
}

fn same_members(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
