//! Entry point for "submission scored" notifications from the host platform.

use std::sync::Arc;

use isic_submission_core::{Config, Storage, SubmissionId};

use crate::eligibility::{Eligibility, check_submission};
use crate::pool::AbstractPool;
use crate::{AbstractJob, Rejection};

/// Sent by the platform once scoring of a submission has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionScored {
    pub submission_id: SubmissionId,
}

/// What the hook did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    NotApplicable,
    Rejected(Rejection),
    Queued,
    /// The check hit an unexpected error, or the pool is gone. Logged.
    Failed,
}

/// Totals over a [`ScoreHook::listen`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenStats {
    pub received: usize,
    pub not_applicable: usize,
    pub rejected: usize,
    pub queued: usize,
    pub failed: usize,
}

impl ListenStats {
    fn record(&mut self, dispatch: &Dispatch) {
        self.received += 1;
        match dispatch {
            Dispatch::NotApplicable => self.not_applicable += 1,
            Dispatch::Rejected(_) => self.rejected += 1,
            Dispatch::Queued => self.queued += 1,
            Dispatch::Failed => self.failed += 1,
        }
    }
}

/// Runs the eligibility check for scored submissions and queues eligible
/// ones for extraction. Never reports errors back to the caller: scoring
/// responses must not depend on abstract processing.
#[derive(Clone)]
pub struct ScoreHook {
    storage: Arc<dyn Storage>,
    config: Arc<Config>,
    jobs: async_channel::Sender<AbstractJob>,
}

impl ScoreHook {
    pub fn new(storage: Arc<dyn Storage>, config: Arc<Config>, pool: &AbstractPool) -> Self {
        Self {
            storage,
            config,
            jobs: pool.sender(),
        }
    }

    /// Handle one event inline. Does blocking storage reads; returns as soon
    /// as the job is queued.
    pub fn on_submission_scored(&self, event: &SubmissionScored) -> Dispatch {
        let submission = &event.submission_id;

        match check_submission(self.storage.as_ref(), &self.config, submission) {
            Ok(Eligibility::NotApplicable) => Dispatch::NotApplicable,
            Ok(Eligibility::Rejected(rejection)) => {
                tracing::warn!(
                    submission = %submission,
                    reason = %rejection,
                    "submission not eligible for abstract extraction"
                );
                Dispatch::Rejected(rejection)
            }
            Ok(Eligibility::Eligible(job)) => match self.jobs.try_send(job) {
                Ok(()) => {
                    tracing::debug!(submission = %submission, "queued abstract extraction");
                    Dispatch::Queued
                }
                Err(_) => {
                    tracing::warn!(submission = %submission, "abstract extraction queue is closed");
                    Dispatch::Failed
                }
            },
            Err(e) => {
                tracing::warn!(
                    submission = %submission,
                    error = %e,
                    "failed to check submission for abstract extraction"
                );
                Dispatch::Failed
            }
        }
    }

    /// Consume events until the channel closes. Each check runs on the
    /// blocking thread pool.
    pub async fn listen(&self, events: async_channel::Receiver<SubmissionScored>) -> ListenStats {
        let mut stats = ListenStats::default();

        while let Ok(event) = events.recv().await {
            let hook = self.clone();
            let dispatch =
                match tokio::task::spawn_blocking(move || hook.on_submission_scored(&event)).await {
                    Ok(dispatch) => dispatch,
                    Err(e) => {
                        tracing::error!(error = %e, "score hook task panicked");
                        Dispatch::Failed
                    }
                };
            stats.record(&dispatch);
        }

        stats
    }
}
