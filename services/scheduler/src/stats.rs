//! Scheduler counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler statistics, shared by the watch loop and every decision task.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Watch records received.
    pub events_received: AtomicU64,
    /// Watch records that could not be decoded.
    pub events_malformed: AtomicU64,
    /// Events that passed the filter and were dispatched.
    pub pods_matched: AtomicU64,
    /// Bind requests accepted by the API server.
    pub pods_bound: AtomicU64,
    /// Bind requests that failed or were rejected.
    pub binds_failed: AtomicU64,
    /// Pods handed back to the fallback scheduler.
    pub fallbacks: AtomicU64,
    /// Node listings that failed and degraded to an empty candidate set.
    pub node_list_failures: AtomicU64,
    /// Rankings served from cache.
    pub rank_cache_hits: AtomicU64,
    /// Rankings that queried the metrics backend.
    pub rank_cache_misses: AtomicU64,
    /// Individual per-node metric queries that failed.
    pub metric_query_failures: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events_received: u64,
    pub events_malformed: u64,
    pub pods_matched: u64,
    pub pods_bound: u64,
    pub binds_failed: u64,
    pub fallbacks: u64,
    pub node_list_failures: u64,
    pub rank_cache_hits: u64,
    pub rank_cache_misses: u64,
    pub metric_query_failures: u64,
}

impl SchedulerStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            events_received: load(&self.events_received),
            events_malformed: load(&self.events_malformed),
            pods_matched: load(&self.pods_matched),
            pods_bound: load(&self.pods_bound),
            binds_failed: load(&self.binds_failed),
            fallbacks: load(&self.fallbacks),
            node_list_failures: load(&self.node_list_failures),
            rank_cache_hits: load(&self.rank_cache_hits),
            rank_cache_misses: load(&self.rank_cache_misses),
            metric_query_failures: load(&self.metric_query_failures),
        }
    }
}
