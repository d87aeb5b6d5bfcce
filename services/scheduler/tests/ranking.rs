//! Ranking and candidate caching against in-memory gateways.


use std::sync::Arc;
use std::time::Duration;

use harness::{context, node, settings, FakeKube, FakeMetrics};
use msched_scheduler::cache::ExpiringCache;
use msched_scheduler::ranker::{BestNode, NodeRanker, RankError};
use msched_scheduler::stats::SchedulerStats;
use msched_sysdig::MetricsSource;

fn names(nodes: &[&str]) -> Vec<String> {
    nodes.iter().map(|n| n.to_string()).collect()
}

fn ranker(metrics: &Arc<FakeMetrics>, metric: &str) -> (NodeRanker, Arc<ExpiringCache<Vec<String>>>) {
    let node_list = Arc::new(ExpiringCache::new(Duration::from_secs(15)));
    let ranker = NodeRanker::new(
        Arc::clone(metrics) as Arc<dyn MetricsSource>,
        metric.parse().unwrap(),
        Duration::from_secs(60),
        Arc::clone(&node_list),
        Duration::from_secs(15),
        Arc::new(SchedulerStats::default()),
    );
    (ranker, node_list)
}

#[tokio::test(start_paused = true)]
async fn test_empty_candidate_set() {
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    let (ranker, _) = ranker(&metrics, "cpu.used.percent");

    assert_eq!(ranker.best_node(&[]).await, Err(RankError::EmptyCandidateSet));
    assert_eq!(metrics.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_query_failing_is_no_node_found() {
    let metrics = FakeMetrics::failing();
    let (ranker, _) = ranker(&metrics, "cpu.used.percent");

    let result = ranker.best_node(&names(&["n1", "n2"])).await;
    assert_eq!(result, Err(RankError::NoNodeFound));
    assert_eq!(metrics.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_queries_use_short_host_names() {
    let metrics = FakeMetrics::with_values(&[("ip-10-0-0-1", 3.0), ("ip-10-0-0-2", 1.0)]);
    let (ranker, _) = ranker(&metrics, "cpu.used.percent");

    let best = ranker
        .best_node(&names(&["ip-10-0-0-1.ec2.internal", "ip-10-0-0-2.ec2.internal"]))
        .await
        .unwrap();

    assert_eq!(best.name, "ip-10-0-0-2.ec2.internal");
    let mut calls = metrics.calls();
    calls.sort();
    assert_eq!(calls, names(&["ip-10-0-0-1", "ip-10-0-0-2"]));
}

#[tokio::test(start_paused = true)]
async fn test_same_set_within_timeout_queries_once() {
    let metrics = FakeMetrics::with_values(&[("n1", 4.0), ("n2", 1.0)]);
    let (ranker, node_list) = ranker(&metrics, "cpu.used.percent");
    node_list.set(names(&["n1", "n2"]));

    let first = ranker.best_node(&names(&["n1", "n2"])).await.unwrap();
    let second = ranker.best_node(&names(&["n2", "n1"])).await.unwrap();

    assert_eq!(first, BestNode { name: "n2".into(), value: 1.0 });
    assert_eq!(second, first);
    assert_eq!(metrics.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_changed_set_bypasses_cached_result() {
    let metrics = FakeMetrics::with_values(&[("n1", 4.0), ("n2", 2.0), ("n3", 1.0)]);
    let (ranker, node_list) = ranker(&metrics, "cpu.used.percent");

    node_list.set(names(&["n1", "n2"]));
    let best = ranker.best_node(&names(&["n1", "n2"])).await.unwrap();
    assert_eq!(best.name, "n2");
    assert_eq!(metrics.call_count(), 2);

    node_list.set(names(&["n1", "n2", "n3"]));
    let best = ranker.best_node(&names(&["n1", "n2", "n3"])).await.unwrap();
    assert_eq!(best.name, "n3");
    assert_eq!(metrics.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cached_result_ignored_when_node_list_expired() {
    let metrics = FakeMetrics::with_values(&[("n1", 4.0), ("n2", 1.0)]);
    let (ranker, node_list) = ranker(&metrics, "cpu.used.percent");
    node_list.set(names(&["n1", "n2"]));

    ranker.best_node(&names(&["n1", "n2"])).await.unwrap();
    assert_eq!(metrics.call_count(), 2);

    tokio::time::advance(Duration::from_secs(16)).await;
    ranker.best_node(&names(&["n1", "n2"])).await.unwrap();
    assert_eq!(metrics.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_queries_run_concurrently() {
    let metrics = FakeMetrics::with_values(&[("n1", 4.0), ("n2", 1.0), ("n3", 2.0)]);
    metrics.set_delay(Duration::from_secs(1));
    let (ranker, _) = ranker(&metrics, "cpu.used.percent");

    let started = tokio::time::Instant::now();
    let best = ranker.best_node(&names(&["n1", "n2", "n3"])).await.unwrap();

    assert_eq!(best.name, "n2");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_candidates_are_ready_nodes_and_cached() {
    let kube = FakeKube::new();
    kube.set_nodes(vec![node("n1", true), node("n2", false), node("n3", true)]);
    let metrics = FakeMetrics::failing();
    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));

    assert_eq!(ctx.candidates().candidates().await, names(&["n1", "n3"]));
    assert_eq!(ctx.candidates().candidates().await, names(&["n1", "n3"]));
    assert_eq!(kube.node_list_calls(), 1);

    tokio::time::advance(Duration::from_secs(16)).await;
    ctx.candidates().candidates().await;
    assert_eq!(kube.node_list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_node_list_failure_is_not_cached() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    kube.fail_node_list(true);
    let metrics = FakeMetrics::failing();
    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));

    assert!(ctx.candidates().candidates().await.is_empty());
    assert_eq!(ctx.stats().snapshot().node_list_failures, 1);

    kube.fail_node_list(false);
    assert_eq!(ctx.candidates().candidates().await, names(&["n1"]));
    assert_eq!(kube.node_list_calls(), 2);
}
