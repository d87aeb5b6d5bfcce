//! # msched-kube
//!
//! The slice of the Kubernetes API the scheduler talks to.
//!
//! ## Operations
//!
//! - Listing nodes and their status conditions
//! - Watching pods as a stream of newline-delimited JSON records
//! - Creating pod bindings
//! - Listing deployments and rewriting their pod template scheduler name
//!
//! Connection settings come from a kubeconfig file, the pod service account,
//! or explicit flags.
//!
//! Consumers depend on the [`KubeApi`] trait; [`KubeClient`] is the HTTP
//! implementation backed by `reqwest`.

mod api;
mod client;
mod config;
mod error;
mod kubeconfig;
mod types;
mod watch;

pub use api::{KubeApi, WatchStream};
pub use client::KubeClient;
pub use config::KubeConfig;
pub use error::KubeError;
pub use types::*;
