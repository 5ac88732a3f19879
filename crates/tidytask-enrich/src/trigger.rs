//! Trigger and worker pool.
//!
//! `enqueue` never blocks and never fails the caller: the job goes onto a
//! bounded queue that a dispatcher drains into at most `workers` concurrent
//! runs. Each run has its own timeout, independent of whoever triggered it.
//! A trigger for a task that is already waiting in the queue is coalesced;
//! a trigger that finds the queue full is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tidytask_core::defaults::PIPELINE_EVENT_CAPACITY;
use tidytask_core::{Error, FeatureSet, Result};

use crate::config::EnrichConfig;
use crate::pipeline::{EnrichJob, EnrichmentPipeline, RunOutcome, SkipReason};

/// Event emitted by the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A trigger was accepted onto the queue.
    Queued { job: EnrichJob },
    /// A trigger was dropped because the queue was full.
    Dropped { job: EnrichJob },
    /// A run started.
    Started { job: EnrichJob },
    /// A run stopped before calling the model.
    Skipped { job: EnrichJob, reason: SkipReason },
    /// A run finished; `written` may be empty.
    Completed {
        job: EnrichJob,
        written: FeatureSet,
        restarted: bool,
    },
    /// A run failed or timed out. Nothing was written.
    Failed { job: EnrichJob, error: String },
    /// Worker pool started.
    WorkerStarted,
    /// Worker pool stopped.
    WorkerStopped,
}

struct TriggerInner {
    enabled: bool,
    tx: mpsc::Sender<EnrichJob>,
    /// Keys currently waiting in the queue.
    pending: Mutex<HashSet<(Uuid, Uuid)>>,
    event_tx: broadcast::Sender<PipelineEvent>,
}

/// Entry point called after a task is created or its title/description
/// changes.
#[derive(Clone)]
pub struct EnrichmentTrigger {
    inner: Arc<TriggerInner>,
}

impl EnrichmentTrigger {
    /// Schedule enrichment for a task. Returns `false` when the trigger was
    /// coalesced into an already-queued one, dropped, or enrichment is
    /// disabled.
    pub fn enqueue(&self, owner_id: Uuid, task_id: Uuid) -> bool {
        self.submit(EnrichJob::new(owner_id, task_id))
    }

    fn submit(&self, job: EnrichJob) -> bool {
        if !self.inner.enabled {
            return false;
        }

        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(job.key()) {
            debug!(task_id = %job.task_id, "Trigger coalesced with queued job");
            return false;
        }

        match self.inner.tx.try_send(job) {
            Ok(()) => {
                drop(pending);
                let _ = self.inner.event_tx.send(PipelineEvent::Queued { job });
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                pending.remove(&job.key());
                drop(pending);
                warn!(
                    subsystem = "enrich",
                    component = "trigger",
                    task_id = %job.task_id,
                    owner_id = %job.owner_id,
                    "Enrichment queue full, dropping trigger"
                );
                let _ = self.inner.event_tx.send(PipelineEvent::Dropped { job });
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                pending.remove(&job.key());
                debug!(task_id = %job.task_id, "Enrichment worker stopped, ignoring trigger");
                false
            }
        }
    }

    /// Mark a job as dequeued so new triggers for it are accepted again.
    fn release(&self, job: &EnrichJob) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job.key());
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get a receiver for pipeline events.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.event_tx.subscribe()
    }
}

/// Handle for controlling a running worker pool. Dropping it stops the
/// pool as if `shutdown` had been called.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<PipelineEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the pool to stop taking new jobs. In-flight runs finish.
    /// A pool that already stopped (or never started because enrichment is
    /// disabled) is not an error.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Enrichment worker already stopped");
        }
        Ok(())
    }

    /// Shut down and wait until in-flight runs are done.
    pub async fn shutdown_and_wait(self) -> Result<()> {
        // The dispatcher may already be gone; either way, wait for it.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Enrichment dispatcher panicked: {}", e)))
    }

    /// Get a receiver for pipeline events.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_rx.resubscribe()
    }
}

/// Start the worker pool for `pipeline`.
pub fn start(
    pipeline: Arc<EnrichmentPipeline>,
    config: &EnrichConfig,
) -> (EnrichmentTrigger, WorkerHandle) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (event_tx, event_rx) = broadcast::channel(PIPELINE_EVENT_CAPACITY);

    let trigger = EnrichmentTrigger {
        inner: Arc::new(TriggerInner {
            enabled: config.enabled,
            tx,
            pending: Mutex::new(HashSet::new()),
            event_tx: event_tx.clone(),
        }),
    };

    let dispatcher = Dispatcher {
        pipeline,
        trigger: trigger.clone(),
        event_tx,
        workers: config.workers.max(1),
        run_timeout: config.run_timeout(),
        enabled: config.enabled,
    };
    let task = tokio::spawn(dispatcher.run(rx, shutdown_rx));

    (
        trigger,
        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        },
    )
}

struct Dispatcher {
    pipeline: Arc<EnrichmentPipeline>,
    trigger: EnrichmentTrigger,
    event_tx: broadcast::Sender<PipelineEvent>,
    workers: usize,
    run_timeout: Duration,
    enabled: bool,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<EnrichJob>, mut shutdown_rx: mpsc::Receiver<()>) {
        if !self.enabled {
            info!("Enrichment is disabled, worker not starting");
            return;
        }

        info!(
            subsystem = "enrich",
            component = "worker",
            workers = self.workers,
            run_timeout_secs = self.run_timeout.as_secs(),
            "Enrichment worker started"
        );
        let _ = self.event_tx.send(PipelineEvent::WorkerStarted);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut runs = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                _ = shutdown_rx.recv() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.trigger.release(&job);

            let ctx = RunContext {
                pipeline: self.pipeline.clone(),
                trigger: self.trigger.clone(),
                event_tx: self.event_tx.clone(),
                run_timeout: self.run_timeout,
            };
            runs.spawn(async move {
                ctx.execute(job).await;
                drop(permit);
            });

            while let Some(finished) = runs.try_join_next() {
                if let Err(e) = finished {
                    error!(error = ?e, "Enrichment run panicked");
                }
            }
        }

        info!("Enrichment worker received shutdown signal");
        while let Some(finished) = runs.join_next().await {
            if let Err(e) = finished {
                error!(error = ?e, "Enrichment run panicked");
            }
        }

        let _ = self.event_tx.send(PipelineEvent::WorkerStopped);
        info!("Enrichment worker stopped");
    }
}

/// What one spawned run needs.
struct RunContext {
    pipeline: Arc<EnrichmentPipeline>,
    trigger: EnrichmentTrigger,
    event_tx: broadcast::Sender<PipelineEvent>,
    run_timeout: Duration,
}

impl RunContext {
    async fn execute(self, job: EnrichJob) {
        let start = Instant::now();
        let _ = self.event_tx.send(PipelineEvent::Started { job });

        let event = match tokio::time::timeout(self.run_timeout, self.pipeline.run(job)).await {
            Ok(Ok(RunOutcome::Skipped(reason))) => PipelineEvent::Skipped { job, reason },
            Ok(Ok(outcome)) => {
                let restarted = match outcome.restart() {
                    Some(next) => self.trigger.submit(next),
                    None => false,
                };
                PipelineEvent::Completed {
                    job,
                    written: outcome.written(),
                    restarted,
                }
            }
            Ok(Err(e)) => {
                if e.is_storage() {
                    error!(
                        task_id = %job.task_id,
                        owner_id = %job.owner_id,
                        error = %e,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Enrichment run failed"
                    );
                } else {
                    warn!(
                        task_id = %job.task_id,
                        owner_id = %job.owner_id,
                        error = %e,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Enrichment run failed"
                    );
                }
                PipelineEvent::Failed {
                    job,
                    error: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    task_id = %job.task_id,
                    owner_id = %job.owner_id,
                    "Enrichment run exceeded timeout of {}s",
                    self.run_timeout.as_secs()
                );
                PipelineEvent::Failed {
                    job,
                    error: format!(
                        "Enrichment run exceeded timeout of {}s",
                        self.run_timeout.as_secs()
                    ),
                }
            }
        };

        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_event_clone_and_debug() {
        let job = EnrichJob::new(Uuid::new_v4(), Uuid::new_v4());
        let event = PipelineEvent::Skipped {
            job,
            reason: SkipReason::Missing,
        };
        assert_eq!(event.clone(), event);
        assert!(format!("{:?}", event).contains("Skipped"));
    }
}
