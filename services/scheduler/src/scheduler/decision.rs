//! One scheduling decision: rank, then bind or fall back.

use msched_kube::KubeError;
use tracing::{info, instrument, warn};

use super::event::PendingPod;
use crate::ranker::{BestNode, RankError};
use crate::state::SchedulerContext;
use crate::stats::SchedulerStats;

/// Result type for scheduling decisions.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Failures that stop the scheduler.
///
/// Everything else (bind rejections, metric errors, node list errors) is
/// logged, counted and absorbed by the decision that hit it.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to list deployments for pod {namespace}/{pod}: {source}")]
    FallbackLookup {
        namespace: String,
        pod: String,
        #[source]
        source: KubeError,
    },

    #[error(
        "failed to hand deployment {namespace}/{deployment} to the fallback scheduler, its pods cannot be scheduled: {source}"
    )]
    FallbackUpdate {
        namespace: String,
        deployment: String,
        #[source]
        source: KubeError,
    },
}

/// What a decision did.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A bind was attempted on `node`. `accepted` is false when the API
    /// server rejected it or the request failed.
    Bound {
        node: String,
        value: f64,
        accepted: bool,
    },

    /// Ranking produced no node; `deployments` were switched to the
    /// fallback scheduler.
    FellBack { reason: RankError, deployments: usize },
}

/// Schedule one pending pod.
#[instrument(skip(ctx, pod), fields(pod = %pod.name, namespace = %pod.namespace))]
pub async fn schedule_pod(ctx: &SchedulerContext, pod: &PendingPod) -> SchedulerResult<Decision> {
    info!("Scheduling pod");

    let candidates = ctx.candidates().candidates().await;
    match ctx.ranker().best_node(&candidates).await {
        Ok(best) => {
            let accepted = bind(ctx, pod, &best).await;
            Ok(Decision::Bound {
                node: best.name,
                value: best.value,
                accepted,
            })
        }
        Err(reason) => {
            warn!(error = %reason, fallback = ctx.fallback_scheduler(), "No node ranked, falling back");
            let deployments = fall_back(ctx, pod).await?;
            Ok(Decision::FellBack {
                reason,
                deployments,
            })
        }
    }
}

async fn bind(ctx: &SchedulerContext, pod: &PendingPod, best: &BestNode) -> bool {
    match ctx.kube().bind(&pod.namespace, &pod.name, &best.name).await {
        Ok(status) if status.is_accepted() => {
            SchedulerStats::incr(&ctx.stats().pods_bound);
            info!(node = %best.name, value = best.value, "Pod bound");
            true
        }
        Ok(status) => {
            SchedulerStats::incr(&ctx.stats().binds_failed);
            warn!(
                node = %best.name,
                code = status.code,
                reason = %status.reason,
                message = %status.message,
                "Bind rejected"
            );
            false
        }
        Err(e) => {
            SchedulerStats::incr(&ctx.stats().binds_failed);
            warn!(node = %best.name, error = %e, "Bind request failed");
            false
        }
    }
}

/// Switch the pod's deployment to the fallback scheduler.
///
/// The deployment is located by the pod's `name` label. A missing label
/// selects on an empty name, which matches nothing on a real cluster.
async fn fall_back(ctx: &SchedulerContext, pod: &PendingPod) -> SchedulerResult<usize> {
    SchedulerStats::incr(&ctx.stats().fallbacks);

    let app = pod.name_label.as_deref().unwrap_or_else(|| {
        warn!("Pod has no name label");
        ""
    });

    let selector = format!("metadata.name={app}");
    let deployments = ctx
        .kube()
        .list_deployments(&pod.namespace, &selector)
        .await
        .map_err(|source| SchedulerError::FallbackLookup {
            namespace: pod.namespace.clone(),
            pod: pod.name.clone(),
            source,
        })?;

    if deployments.is_empty() {
        warn!(selector = %selector, "No deployment matches the pod");
    }

    for deployment in &deployments {
        ctx.kube()
            .update_deployment_scheduler_name(deployment, ctx.fallback_scheduler())
            .await
            .map_err(|source| SchedulerError::FallbackUpdate {
                namespace: pod.namespace.clone(),
                deployment: deployment.metadata.name.clone(),
                source,
            })?;
        info!(
            deployment = %deployment.metadata.name,
            scheduler = ctx.fallback_scheduler(),
            "Deployment handed to fallback scheduler"
        );
    }

    Ok(deployments.len())
}
