//! End-to-end tests of the scheduling loop against in-memory gateways.


use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use harness::{
    context, eventually, pending_pod, pod_event, settings, BindCall, FakeKube, FakeMetrics,
    UpdateCall,
};
use msched_kube::KubeError;
use msched_scheduler::scheduler::{SchedulerError, SchedulerResult, SchedulerWorker, WorkerConfig};
use msched_scheduler::state::SchedulerContext;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const RUN_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<SchedulerResult<()>>,
}

impl Running {
    async fn stop(self) -> SchedulerResult<()> {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(RUN_TIMEOUT, self.handle)
            .await
            .expect("worker did not stop")
            .unwrap()
    }

    async fn finished(self) -> SchedulerResult<()> {
        tokio::time::timeout(RUN_TIMEOUT, self.handle)
            .await
            .expect("worker did not finish")
            .unwrap()
    }
}

fn worker_config(max_concurrent_decisions: usize) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_decisions,
        watch_retry_delay: Duration::from_millis(10),
    }
}

fn start(ctx: &Arc<SchedulerContext>, config: WorkerConfig) -> Running {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let worker = SchedulerWorker::new(Arc::clone(ctx), config);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    Running { shutdown, handle }
}

#[tokio::test]
async fn test_binds_pod_to_lowest_value_node() {
    let kube = FakeKube::with_ready_nodes(&["n1", "n2", "n3"]);
    let metrics = FakeMetrics::with_values(&[("n1", 5.0), ("n2", 2.0), ("n3", 8.0)]);
    kube.push_watch(vec![pending_pod("pod-a", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "net.http.request.time"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.binds().is_empty()).await;
    running.stop().await.unwrap();

    assert_eq!(
        kube.binds(),
        vec![BindCall {
            namespace: "default".to_string(),
            pod: "pod-a".to_string(),
            node: "n2".to_string(),
        }]
    );
    assert!(kube.updates().is_empty());

    let stats = ctx.stats().snapshot();
    assert_eq!(stats.pods_matched, 1);
    assert_eq!(stats.pods_bound, 1);
    assert_eq!(stats.fallbacks, 0);
}

#[tokio::test]
async fn test_binds_pod_to_highest_value_node() {
    let kube = FakeKube::with_ready_nodes(&["n1", "n2", "n3"]);
    let metrics = FakeMetrics::with_values(&[("n1", 5.0), ("n2", 2.0), ("n3", 8.0)]);
    kube.push_watch(vec![pending_pod("pod-a", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "+cpu.idle.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.binds().is_empty()).await;
    running.stop().await.unwrap();

    assert_eq!(kube.binds()[0].node, "n3");
}

#[tokio::test]
async fn test_falls_back_when_every_metric_query_fails() {
    let kube = FakeKube::with_ready_nodes(&["n1", "n2", "n3"]);
    kube.set_deployments(&["web"]);
    kube.push_watch(vec![pod_event("ADDED", "pod-a", "custom", Some("web"), "5")]);
    let metrics = FakeMetrics::failing();

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.updates().is_empty()).await;
    running.stop().await.unwrap();

    assert!(kube.binds().is_empty());
    assert_eq!(kube.deployment_selectors(), vec!["metadata.name=web".to_string()]);
    assert_eq!(
        kube.updates(),
        vec![UpdateCall {
            namespace: "default".to_string(),
            deployment: "web".to_string(),
            scheduler: "default-scheduler".to_string(),
        }]
    );
    assert_eq!(metrics.call_count(), 3);

    let stats = ctx.stats().snapshot();
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.metric_query_failures, 3);
}

#[tokio::test]
async fn test_other_scheduler_is_ignored() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![pending_pod("pod-a", "other")]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| ctx.stats().snapshot().events_received == 1).await;
    running.stop().await.unwrap();

    assert_eq!(kube.node_list_calls(), 0);
    assert_eq!(metrics.call_count(), 0);
    assert!(kube.binds().is_empty());
    assert_eq!(ctx.stats().snapshot().pods_matched, 0);
}

#[tokio::test]
async fn test_non_added_events_are_ignored() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![
        pod_event("MODIFIED", "pod-a", "custom", None, "2"),
        pod_event("DELETED", "pod-a", "custom", None, "3"),
    ]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| ctx.stats().snapshot().events_received == 2).await;
    running.stop().await.unwrap();

    assert_eq!(kube.node_list_calls(), 0);
    assert!(kube.binds().is_empty());
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![
        Bytes::from_static(b"{\"type\":\"ADDED\",\"object\":"),
        pending_pod("pod-b", "custom"),
    ]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.binds().is_empty()).await;
    running.stop().await.unwrap();

    assert_eq!(kube.binds()[0].pod, "pod-b");
    let stats = ctx.stats().snapshot();
    assert_eq!(stats.events_received, 2);
    assert_eq!(stats.events_malformed, 1);
}

#[tokio::test]
async fn test_rejected_bind_is_not_fatal() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    kube.set_bind_code(409);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![pending_pod("pod-a", "custom"), pending_pod("pod-b", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| ctx.stats().snapshot().binds_failed == 2).await;
    running.stop().await.unwrap();

    let stats = ctx.stats().snapshot();
    assert_eq!(stats.pods_bound, 0);
    assert_eq!(stats.fallbacks, 0);
}

#[tokio::test]
async fn test_node_list_failure_falls_back_and_is_counted() {
    let kube = FakeKube::new();
    kube.fail_node_list(true);
    kube.set_deployments(&["web"]);
    kube.push_watch(vec![pod_event("ADDED", "pod-a", "custom", Some("web"), "5")]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.updates().is_empty()).await;
    running.stop().await.unwrap();

    assert_eq!(metrics.call_count(), 0);
    let stats = ctx.stats().snapshot();
    assert_eq!(stats.node_list_failures, 1);
    assert_eq!(stats.fallbacks, 1);
}

#[tokio::test]
async fn test_no_ready_nodes_is_not_a_node_list_failure() {
    let kube = FakeKube::new();
    kube.set_nodes(vec![harness::node("n1", false)]);
    kube.set_deployments(&["web"]);
    kube.push_watch(vec![pod_event("ADDED", "pod-a", "custom", Some("web"), "5")]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.updates().is_empty()).await;
    running.stop().await.unwrap();

    let stats = ctx.stats().snapshot();
    assert_eq!(stats.node_list_failures, 0);
    assert_eq!(stats.fallbacks, 1);
}

#[tokio::test]
async fn test_fallback_update_failure_stops_the_worker() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    kube.set_deployments(&["web"]);
    kube.fail_updates(true);
    kube.push_watch(vec![pod_event("ADDED", "pod-a", "custom", Some("web"), "5")]);
    let metrics = FakeMetrics::failing();

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    let err = running.finished().await.unwrap_err();
    match err {
        SchedulerError::FallbackUpdate {
            namespace,
            deployment,
            source: KubeError::Api { status, .. },
        } => {
            assert_eq!(namespace, "default");
            assert_eq!(deployment, "web");
            assert_eq!(status, 422);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fallback_lookup_failure_stops_the_worker() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    kube.fail_deployment_list(true);
    kube.push_watch(vec![pod_event("ADDED", "pod-a", "custom", Some("web"), "5")]);
    let metrics = FakeMetrics::failing();

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    let err = running.finished().await.unwrap_err();
    assert!(matches!(err, SchedulerError::FallbackLookup { ref pod, .. } if pod == "pod-a"));
}

#[tokio::test]
async fn test_watch_resumes_from_last_resource_version() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![
        pod_event("MODIFIED", "pod-x", "custom", None, "41"),
        pod_event("MODIFIED", "pod-y", "custom", None, "42"),
    ]);
    kube.push_watch(vec![pending_pod("pod-a", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| kube.watch_versions().len() >= 3 && !kube.binds().is_empty()).await;
    running.stop().await.unwrap();

    let versions = kube.watch_versions();
    assert_eq!(versions[0], None);
    assert_eq!(versions[1], Some("42".to_string()));
    assert_eq!(versions[2], Some("1".to_string()));
    assert_eq!(kube.binds().len(), 1);
}

#[tokio::test]
async fn test_watch_error_event_clears_resume_version() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    let expired = serde_json::json!({
        "type": "ERROR",
        "object": {"kind": "Status", "code": 410, "reason": "Expired"}
    });
    kube.push_watch(vec![
        pod_event("MODIFIED", "pod-x", "custom", None, "7"),
        Bytes::from(serde_json::to_vec(&expired).unwrap()),
    ]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| kube.watch_versions().len() >= 2).await;
    running.stop().await.unwrap();

    assert_eq!(kube.watch_versions()[1], None);
}

#[tokio::test]
async fn test_watch_transport_error_reconnects() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch_results(vec![
        Ok(pod_event("MODIFIED", "pod-x", "custom", None, "9")),
        Err(KubeError::Api {
            status: 500,
            message: "stream reset".to_string(),
        }),
    ]);
    kube.push_watch(vec![pending_pod("pod-a", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| !kube.binds().is_empty()).await;
    running.stop().await.unwrap();

    assert_eq!(kube.watch_versions()[1], Some("9".to_string()));
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight_decisions() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    metrics.set_delay(Duration::from_secs(3600));
    kube.push_watch(vec![pending_pod("pod-a", "custom")]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(32));

    eventually(|| metrics.call_count() == 1).await;
    running.stop().await.unwrap();

    assert!(kube.binds().is_empty());
    assert_eq!(ctx.stats().snapshot().pods_bound, 0);
}

#[tokio::test]
async fn test_decisions_are_bounded() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    kube.set_bind_delay(Duration::from_millis(30));
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);
    kube.push_watch(vec![
        pending_pod("pod-a", "custom"),
        pending_pod("pod-b", "custom"),
        pending_pod("pod-c", "custom"),
    ]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let running = start(&ctx, worker_config(1));

    eventually(|| ctx.stats().snapshot().pods_bound == 3).await;
    running.stop().await.unwrap();

    assert_eq!(kube.peak_binds_in_flight(), 1);
}

#[tokio::test]
async fn test_stops_when_shutdown_sender_dropped() {
    let kube = FakeKube::with_ready_nodes(&["n1"]);
    let metrics = FakeMetrics::with_values(&[("n1", 1.0)]);

    let ctx = context(&kube, &metrics, settings("custom", "cpu.used.percent"));
    let Running { shutdown, handle } = start(&ctx, worker_config(32));

    eventually(|| !kube.watch_versions().is_empty()).await;
    drop(shutdown);

    let result = tokio::time::timeout(RUN_TIMEOUT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}
