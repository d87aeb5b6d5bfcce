//! Scheduler background worker.
//!
//! Watches pods, admits those that ask for this scheduler and schedules each
//! in its own task. Decision tasks are bounded by a semaphore. On shutdown
//! the watch is dropped and in-flight decisions are aborted.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use msched_kube::{WatchEventType, WatchStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use super::decision::{schedule_pod, Decision, SchedulerResult};
use super::event::{self, PendingPod};
use crate::state::SchedulerContext;
use crate::stats::SchedulerStats;

type DecisionTasks = JoinSet<SchedulerResult<Decision>>;

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on decisions in flight.
    pub max_concurrent_decisions: usize,

    /// Pause before reopening a failed or closed pod watch.
    pub watch_retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_decisions: 32,
            watch_retry_delay: Duration::from_secs(1),
        }
    }
}

enum Flow {
    Reconnect,
    Shutdown,
}

/// Drives the pod watch and dispatches decisions.
pub struct SchedulerWorker {
    ctx: Arc<SchedulerContext>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl SchedulerWorker {
    pub fn new(ctx: Arc<SchedulerContext>, config: WorkerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_decisions.max(1)));
        Self {
            ctx,
            config,
            permits,
        }
    }

    /// Run until shutdown is signaled or a decision fails fatally.
    #[instrument(skip(self, shutdown), fields(scheduler = %self.ctx.scheduler_name()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!(
            metric = %self.ctx.ranker().selection().metric,
            order = %self.ctx.ranker().selection().order,
            max_concurrent_decisions = self.config.max_concurrent_decisions,
            "Starting scheduler worker"
        );

        let mut tasks = DecisionTasks::new();
        let result = self.watch_loop(&mut tasks, &mut shutdown).await;

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Aborting in-flight decisions");
        }
        tasks.shutdown().await;

        let stats = self.ctx.stats().snapshot();
        info!(?stats, "Scheduler worker stopped");
        result
    }

    async fn watch_loop(
        &self,
        tasks: &mut DecisionTasks,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SchedulerResult<()> {
        let mut resume: Option<String> = None;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.ctx.kube().watch_pods(resume.as_deref()).await {
                Ok(stream) => {
                    info!(resource_version = resume.as_deref(), "Pod watch opened");
                    if let Flow::Shutdown = self.consume(stream, &mut resume, tasks, shutdown).await? {
                        return Ok(());
                    }
                }
                Err(e) => warn!(error = %e, "Failed to open pod watch"),
            }

            let delay = tokio::time::sleep(self.config.watch_retry_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return Ok(());
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined)?,
                }
            }
        }
    }

    async fn consume(
        &self,
        mut stream: WatchStream,
        resume: &mut Option<String>,
        tasks: &mut DecisionTasks,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SchedulerResult<Flow> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        return Ok(Flow::Shutdown);
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined)?,
                record = stream.next() => match record {
                    Some(Ok(record)) => {
                        let Some(pod) = self.admit(&record, resume) else {
                            continue;
                        };
                        let Some(permit) = self.acquire(tasks, shutdown).await? else {
                            return Ok(Flow::Shutdown);
                        };
                        self.dispatch(pod, permit, tasks);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Pod watch failed");
                        return Ok(Flow::Reconnect);
                    }
                    None => {
                        info!("Pod watch closed by server");
                        return Ok(Flow::Reconnect);
                    }
                },
            }
        }
    }

    /// Decode a record and decide whether it needs scheduling.
    fn admit(&self, record: &[u8], resume: &mut Option<String>) -> Option<PendingPod> {
        let stats = self.ctx.stats();
        SchedulerStats::incr(&stats.events_received);

        let event = match event::decode(record) {
            Ok(event) => event,
            Err(e) => {
                SchedulerStats::incr(&stats.events_malformed);
                warn!(error = %e, "Discarding undecodable watch record");
                return None;
            }
        };

        if event.event_type == WatchEventType::Error {
            warn!("Pod watch reported an error, next watch starts from current state");
            *resume = None;
            return None;
        }

        if let Some(version) = &event.object.metadata.resource_version {
            *resume = Some(version.clone());
        }

        if !event::wants_scheduling(&event, self.ctx.scheduler_name()) {
            return None;
        }

        SchedulerStats::incr(&stats.pods_matched);
        Some(PendingPod::from(event.object))
    }

    /// Wait for a decision slot, still reaping finished tasks and honoring shutdown.
    async fn acquire(
        &self,
        tasks: &mut DecisionTasks,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SchedulerResult<Option<OwnedSemaphorePermit>> {
        loop {
            tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => return Ok(permit.ok()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(None);
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined)?,
            }
        }
    }

    fn dispatch(&self, pod: PendingPod, permit: OwnedSemaphorePermit, tasks: &mut DecisionTasks) {
        debug!(pod = %pod.name, namespace = %pod.namespace, "Dispatching decision");
        let ctx = Arc::clone(&self.ctx);
        tasks.spawn(async move {
            let _permit = permit;
            schedule_pod(&ctx, &pod).await
        });
    }
}

/// Surface a finished decision. Only fatal decision errors propagate.
fn reap(joined: Result<SchedulerResult<Decision>, JoinError>) -> SchedulerResult<()> {
    match joined {
        Ok(Ok(decision)) => {
            debug!(?decision, "Decision finished");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => {
            error!(error = %e, "Decision task panicked");
            Ok(())
        }
    }
}
