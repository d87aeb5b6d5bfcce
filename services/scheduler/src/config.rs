//! Scheduler configuration.
//!
//! Every setting is a command-line flag; the ones an operator usually sets
//! in a deployment manifest also read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use msched_kube::{KubeConfig, KubeError};
use msched_sysdig::SysdigConfig;

use crate::ranker::MetricSelection;
use crate::scheduler::WorkerConfig;
use crate::state::SchedulerSettings;

/// Kubernetes scheduler that places pods on the node with the best live metric.
#[derive(Debug, Clone, Parser)]
#[command(name = "msched")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Scheduler name pods select through spec.schedulerName.
    #[arg(short = 's', long, env = "SDC_SCHEDULER")]
    pub scheduler_name: String,

    /// Metric to rank nodes by. Prefix with + to prefer higher values;
    /// - or no prefix prefers lower values.
    #[arg(short = 'm', long, env = "SDC_METRIC", allow_hyphen_values = true)]
    pub metric: MetricSelection,

    /// Sysdig Monitor API token.
    #[arg(short = 't', long, env = "SDC_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Sysdig Monitor API base URL.
    #[arg(long, env = "SDC_URL", default_value = SysdigConfig::DEFAULT_URL)]
    pub sysdig_url: String,

    /// Trailing window, in seconds, each metric query averages over.
    #[arg(long, env = "SDC_WINDOW_SECS", default_value_t = 60)]
    pub metric_window_secs: u64,

    /// Kubernetes API server URL. Takes precedence over any kubeconfig.
    #[arg(long, env = "KUBE_API_URL")]
    pub kube_api_url: Option<String>,

    /// Kubeconfig file. Defaults to ~/.kube/config; in-cluster discovery is
    /// used when neither exists.
    #[arg(short = 'k', long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// File holding the bearer token for the API server.
    #[arg(long)]
    pub kube_token_file: Option<PathBuf>,

    /// Extra CA bundle (PEM) trusted for the API server.
    #[arg(long)]
    pub kube_ca_file: Option<PathBuf>,

    /// Client certificate (PEM) for the API server.
    #[arg(long, requires = "kube_client_key")]
    pub kube_client_cert: Option<PathBuf>,

    /// Client private key (PEM) for the API server.
    #[arg(long, requires = "kube_client_cert")]
    pub kube_client_key: Option<PathBuf>,

    /// Scheduler deployments are handed to when no node can be ranked.
    #[arg(long, default_value = SchedulerSettings::DEFAULT_FALLBACK_SCHEDULER)]
    pub fallback_scheduler: String,

    /// Lifetime of the Ready node list, in seconds.
    #[arg(long, default_value_t = 15)]
    pub node_cache_secs: u64,

    /// Lifetime of the last ranking result, in seconds.
    #[arg(long, default_value_t = 15)]
    pub best_node_cache_secs: u64,

    /// Maximum scheduling decisions in flight.
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_concurrent_decisions: u32,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, env = "MSCHED_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Kubernetes connection settings, from the first of: an explicit API
    /// URL, the given kubeconfig, the default kubeconfig, the service account.
    /// Token, CA and client certificate flags apply on top.
    pub fn kube_config(&self) -> Result<KubeConfig, KubeError> {
        let mut config = match (&self.kube_api_url, self.kubeconfig_path()) {
            (Some(url), _) => KubeConfig::new(url.as_str()),
            (None, Some(path)) => KubeConfig::from_kubeconfig(path)?,
            (None, None) => KubeConfig::in_cluster()?,
        };

        if let Some(path) = &self.kube_token_file {
            config = config.with_token_file(path)?;
        }
        if let Some(path) = &self.kube_ca_file {
            config = config.with_ca_file(path)?;
        }
        if let (Some(cert), Some(key)) = (&self.kube_client_cert, &self.kube_client_key) {
            config = config.with_client_identity(cert, key)?;
        }

        Ok(config)
    }

    /// The kubeconfig to load. An explicit path must exist; the default one
    /// is skipped when missing.
    fn kubeconfig_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Some(path.clone());
        }
        KubeConfig::default_kubeconfig_path().filter(|path| path.is_file())
    }

    pub fn sysdig_config(&self) -> SysdigConfig {
        let mut config = SysdigConfig::new(self.token.as_str());
        config.base_url = self.sysdig_url.clone();
        config
    }

    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            scheduler_name: self.scheduler_name.clone(),
            fallback_scheduler: self.fallback_scheduler.clone(),
            selection: self.metric.clone(),
            metric_window: Duration::from_secs(self.metric_window_secs),
            node_cache_ttl: Duration::from_secs(self.node_cache_secs),
            best_node_cache_ttl: Duration::from_secs(self.best_node_cache_secs),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_decisions: self.max_concurrent_decisions as usize,
            ..WorkerConfig::default()
        }
    }
}
