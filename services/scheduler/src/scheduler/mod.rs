//! Scheduling loop.
//!
//! The worker consumes the pod watch stream, admits events for pending pods
//! that request this scheduler, and runs one decision task per admitted pod:
//! rank the candidates, then bind the pod or fall back to the default
//! scheduler.

mod decision;
mod event;
mod worker;

pub use decision::{schedule_pod, Decision, SchedulerError, SchedulerResult};
pub use event::{decode, wants_scheduling, PendingPod, PodEvent};
pub use worker::{SchedulerWorker, WorkerConfig};
