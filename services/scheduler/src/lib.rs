//! Metric-driven Kubernetes scheduler.
//!
//! Watches for pending pods that request this scheduler by name, ranks the
//! Ready nodes by a live Sysdig metric and binds each pod to the winner.
//! When no node can be ranked, the pod's deployment is handed back to the
//! cluster's default scheduler.
//!
//! ## Layout
//!
//! - `cache`: time-boxed single-value cache
//! - `candidates`: Ready node names, cached
//! - `ranker`: concurrent metric fan-out and reduction, cached per candidate set
//! - `scheduler`: watch consumption, per-pod decisions, bind or fallback
//! - `state`: the context object shared by all of the above
//! - `stats`: counters logged when the worker stops
//! - `config`: command-line and environment settings

pub mod cache;
pub mod candidates;
pub mod config;
pub mod ranker;
pub mod scheduler;
pub mod state;
pub mod stats;
