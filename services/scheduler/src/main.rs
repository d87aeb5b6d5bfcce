//! msched
//!
//! Runs the metric-driven scheduler against the configured cluster until
//! interrupted or until a fallback cannot be applied.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use msched_kube::KubeClient;
use msched_scheduler::config::Config;
use msched_scheduler::scheduler::SchedulerWorker;
use msched_scheduler::state::SchedulerContext;
use msched_sysdig::SysdigClient;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        scheduler_name = %config.scheduler_name,
        metric = %config.metric.metric,
        order = %config.metric.order,
        sysdig_url = %config.sysdig_url,
        "Starting msched"
    );

    let kube_config = config
        .kube_config()
        .context("failed to resolve Kubernetes connection settings")?;
    info!(api_url = %kube_config.api_url, "Kubernetes API configured");

    let kube = KubeClient::new(&kube_config).context("failed to build Kubernetes client")?;
    let metrics = SysdigClient::new(&config.sysdig_config()).context("failed to build Sysdig client")?;

    let ctx = Arc::new(SchedulerContext::new(
        Arc::new(kube),
        Arc::new(metrics),
        config.settings(),
    ));
    let worker = SchedulerWorker::new(ctx, config.worker_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            (&mut worker_handle).await
        }
        result = &mut worker_handle => result,
    };

    match result {
        Ok(Ok(())) => {
            info!("msched shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Scheduler stopped on a fatal error");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Scheduler task panicked");
            Err(e.into())
        }
    }
}
