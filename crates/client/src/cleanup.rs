//! Deferred server-side job disposal.
//!
//! After an artifact is retrieved the backend still holds the job and its
//! output file. [`ScheduledCleanup`] waits a grace period, then issues
//! `DELETE /job/{job_id}` once. Failures are logged and never retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use upscale_core::types::JobId;

use crate::api::UpscaleApi;
use crate::events::{JobEvent, JobEventKind};

/// How a cleanup attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted,
    Failed(String),
}

/// A pending `DELETE` for one job.
pub struct ScheduledCleanup {
    job_id: JobId,
    expedite: CancellationToken,
    task: JoinHandle<CleanupOutcome>,
}

impl ScheduledCleanup {
    /// Schedule the deletion of `job_id` after `delay`.
    pub fn schedule(
        api: Arc<UpscaleApi>,
        job_id: JobId,
        delay: Duration,
        event_tx: broadcast::Sender<JobEvent>,
    ) -> Self {
        let expedite = CancellationToken::new();
        let task = tokio::spawn(run_cleanup(
            api,
            job_id.clone(),
            delay,
            expedite.clone(),
            event_tx,
        ));

        tracing::debug!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "Cleanup scheduled");

        Self {
            job_id,
            expedite,
            task,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Skip the rest of the grace period and delete now.
    pub fn expedite(&self) {
        self.expedite.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the attempt to finish. Returns `None` if the task panicked
    /// or was aborted.
    pub async fn wait(self) -> Option<CleanupOutcome> {
        match self.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Cleanup task did not finish");
                None
            }
        }
    }
}

async fn run_cleanup(
    api: Arc<UpscaleApi>,
    job_id: JobId,
    delay: Duration,
    expedite: CancellationToken,
    event_tx: broadcast::Sender<JobEvent>,
) -> CleanupOutcome {
    tokio::select! {
        _ = expedite.cancelled() => {
            tracing::debug!(job_id = %job_id, "Cleanup expedited");
        }
        _ = tokio::time::sleep(delay) => {}
    }

    let outcome = match api.delete_job(&job_id).await {
        Ok(()) => {
            tracing::info!(job_id = %job_id, "Server-side job cleaned up");
            CleanupOutcome::Deleted
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Cleanup failed, job left on server");
            CleanupOutcome::Failed(e.to_string())
        }
    };

    let _ = event_tx.send(JobEvent::new(job_id, JobEventKind::CleanedUp));
    outcome
}
