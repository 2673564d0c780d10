//! Worker pool for abstract extraction.
//!
//! Jobs are queued on an unbounded channel and picked up by `num_workers`
//! worker tasks. Extraction does blocking storage I/O and ZIP decompression,
//! so each job runs on tokio's blocking thread pool. Submitters never wait
//! for or see the result; an optional observer does.

use std::sync::Arc;

use isic_submission_core::{Config, Storage, SubmissionId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AbstractJob;
use crate::extract::{ExtractOutcome, save_abstract};

/// What happened to one queued job.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Finished {
        submission_id: SubmissionId,
        outcome: ExtractOutcome,
    },
    Failed {
        submission_id: SubmissionId,
        error: String,
    },
    /// Dropped from the queue after cancellation.
    Cancelled { submission_id: SubmissionId },
}

impl JobEvent {
    pub fn submission_id(&self) -> &SubmissionId {
        match self {
            JobEvent::Finished { submission_id, .. }
            | JobEvent::Failed { submission_id, .. }
            | JobEvent::Cancelled { submission_id } => submission_id,
        }
    }
}

/// Callback invoked once per job, from a worker task.
pub type JobObserver = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// A pool of worker tasks that extract and attach submission abstracts.
///
/// Submit jobs via [`submit()`](AbstractPool::submit); it never blocks.
pub struct AbstractPool {
    job_tx: async_channel::Sender<AbstractJob>,
    pool_handle: JoinHandle<()>,
}

impl AbstractPool {
    /// Create a new pool with `num_workers` worker tasks (at least one).
    /// Must be called from within a tokio runtime.
    pub fn new(
        storage: Arc<dyn Storage>,
        config: Arc<Config>,
        cancel: CancellationToken,
        num_workers: usize,
        observer: Option<JobObserver>,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<AbstractJob>();

        let pool_handle = tokio::spawn(async move {
            let mut worker_handles = Vec::with_capacity(num_workers.max(1));

            for worker in 0..num_workers.max(1) {
                worker_handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    storage.clone(),
                    config.clone(),
                    cancel.clone(),
                    observer.clone(),
                )));
            }

            // Drop our clone so workers are the last holders
            drop(job_rx);

            // Workers exit once the queue is closed and drained
            for h in worker_handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Get a cloneable sender for submitting jobs from multiple places.
    pub fn sender(&self) -> async_channel::Sender<AbstractJob> {
        self.job_tx.clone()
    }

    /// Queue a job. Returns false if the pool has been shut down.
    pub fn submit(&self, job: AbstractJob) -> bool {
        self.job_tx.try_send(job).is_ok()
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.job_tx.len()
    }

    /// Close the queue and wait for workers to finish what is queued.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker: usize,
    rx: async_channel::Receiver<AbstractJob>,
    storage: Arc<dyn Storage>,
    config: Arc<Config>,
    cancel: CancellationToken,
    observer: Option<JobObserver>,
) {
    let notify = |event: JobEvent| {
        if let Some(observer) = &observer {
            observer(event);
        }
    };

    while let Ok(job) = rx.recv().await {
        let submission_id = job.submission.id.clone();

        if cancel.is_cancelled() {
            tracing::debug!(worker, submission = %submission_id, "skipping: cancelled");
            notify(JobEvent::Cancelled { submission_id });
            continue;
        }

        let storage = storage.clone();
        let config = config.clone();
        let result =
            tokio::task::spawn_blocking(move || save_abstract(storage.as_ref(), &config, job))
                .await;

        let event = match result {
            Ok(Ok(outcome)) => {
                match &outcome {
                    ExtractOutcome::Attached(attached) => tracing::info!(
                        worker,
                        submission = %submission_id,
                        file = %attached.file.id,
                        name = %attached.file.name,
                        url = %attached.documentation_url,
                        "attached submission abstract"
                    ),
                    ExtractOutcome::Rejected(rejection) => tracing::warn!(
                        worker,
                        submission = %submission_id,
                        reason = %rejection,
                        "abstract extraction aborted"
                    ),
                }
                JobEvent::Finished {
                    submission_id,
                    outcome,
                }
            }
            Ok(Err(e)) => {
                tracing::error!(
                    worker,
                    submission = %submission_id,
                    error = %e,
                    "abstract extraction failed"
                );
                JobEvent::Failed {
                    submission_id,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(
                    worker,
                    submission = %submission_id,
                    error = %e,
                    "abstract extraction task panicked"
                );
                JobEvent::Failed {
                    submission_id,
                    error: e.to_string(),
                }
            }
        };
        notify(event);
    }
}
