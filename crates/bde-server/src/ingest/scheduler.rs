//! Background job scheduler
//!
//! A single poll loop scans for pending jobs every `poll_interval` and hands
//! each one to a worker task. Concurrency is bounded by a semaphore sized
//! for I/O-bound pipelines; acquisition is cancellable by shutdown so a full
//! pool never wedges a stopping server. Claiming is atomic: with several
//! schedulers running, exactly one wins each job. A panicking worker marks
//! its job failed and never takes the scheduler down.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pipeline::ImportPipeline;
use crate::config::SchedulerConfig;
use crate::models::{JobKind, JobStatus};
use crate::repository::Repositories;

/// Polls for pending jobs and runs import pipelines under a bounded worker
/// budget.
pub struct JobScheduler {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    repos: Arc<Repositories>,
    pipeline: Arc<ImportPipeline>,
    poll_interval: Duration,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    pub fn new(
        repos: Arc<Repositories>,
        pipeline: Arc<ImportPipeline>,
        config: &SchedulerConfig,
    ) -> Self {
        info!(
            worker_cap = config.worker_cap,
            poll_interval_secs = config.poll_interval_secs,
            "Initializing job scheduler worker pool"
        );

        Self {
            inner: Arc::new(Inner {
                repos,
                pipeline,
                poll_interval: Duration::from_secs(config.poll_interval_secs),
                semaphore: Arc::new(Semaphore::new(config.worker_cap)),
                shutdown: CancellationToken::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the background poll loop. Only the first call is honored.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("Job scheduler already started");
            return;
        }

        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(async move { inner.run().await }));
        info!("Job processor started");
    }

    /// Cancel the loop and wait until every in-flight worker has persisted
    /// its final job row. Idempotent.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = ?e, "Job processor task failed");
            }
            info!("Job processor stopped");
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.process_pending(&mut workers).await,
                // Reap finished workers so the set stays small.
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }

        info!(
            in_flight = workers.len(),
            "Job processor stopping, draining workers"
        );
        while workers.join_next().await.is_some() {}
    }

    async fn process_pending(&self, workers: &mut JoinSet<()>) {
        let jobs = match self.repos.jobs.list_pending().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = ?e, "Failed to get pending jobs");
                return;
            }
        };

        for mut job in jobs {
            // Backpressure: block for a worker slot, but give up on shutdown.
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            // Exactly one scheduler wins the pending -> processing flip.
            match self.repos.jobs.claim_pending(job.id).await {
                Ok(true) => {}
                Ok(false) => {
                    drop(permit);
                    continue;
                }
                Err(e) => {
                    error!(error = ?e, job_id = %job.id, "Failed to claim job");
                    drop(permit);
                    continue;
                }
            }

            job.status = JobStatus::Processing;
            if job.started_at.is_none() {
                job.started_at = Some(Utc::now());
            }

            let pipeline = self.pipeline.clone();
            let repos = self.repos.clone();
            let cancel = self.shutdown.clone();
            workers.spawn(async move {
                // The permit rides along with the worker and frees the slot
                // on every exit path, panics included.
                let _permit = permit;

                info!(job_id = %job.id, kind = %job.kind, "Processing job");

                if job.kind != JobKind::Import {
                    warn!(job_id = %job.id, "Export job not processed in background");
                    return;
                }

                let outcome =
                    AssertUnwindSafe(pipeline.process(&mut job, &cancel))
                        .catch_unwind()
                        .await;

                match outcome {
                    Ok(Ok(())) => {}
                    // The pipeline already persisted the failed state.
                    Ok(Err(e)) => {
                        error!(error = %e, job_id = %job.id, "Import processing failed");
                    }
                    Err(panic) => {
                        error!(
                            job_id = %job.id,
                            panic = %panic_message(panic.as_ref()),
                            "Job processing panicked - recovered"
                        );
                        job.status = JobStatus::Failed;
                        if let Err(e) = repos.jobs.update(&job).await {
                            error!(
                                error = ?e,
                                job_id = %job.id,
                                "Failed to persist failed status after panic"
                            );
                        }
                    }
                }
            });
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::repository::memory;

    fn scheduler() -> JobScheduler {
        let repos = Arc::new(memory::repositories());
        let pipeline = Arc::new(ImportPipeline::new(repos.clone(), ImportConfig::default()));
        JobScheduler::new(
            repos,
            pipeline,
            &SchedulerConfig {
                poll_interval_secs: 1,
                worker_cap: 4,
            },
        )
    }

    #[tokio::test]
    async fn start_is_honored_once_and_stop_is_idempotent() {
        let scheduler = scheduler();

        scheduler.start().await;
        scheduler.start().await; // no second loop spawned

        scheduler.stop().await;
        scheduler.stop().await; // no-op
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let scheduler = scheduler();
        scheduler.stop().await;
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new("boom".to_string());
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
