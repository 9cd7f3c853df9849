//! Job orchestration.
//!
//! [`Orchestrator`] runs one job at a time through the backend protocol:
//!
//! 1. validate the selections and generate a job id;
//! 2. open the progress channel (when enabled) and wait for it, bounded by
//!    [`ClientConfig::ready_timeout`];
//! 3. submit the job;
//! 4. on every completion sentinel (or poll tick once the channel is
//!    degraded) check the job status, and once it is `completed` fetch the
//!    artifact;
//! 5. publish the result, schedule the server-side cleanup, close the
//!    channel.
//!
//! Without a progress channel the submit response drives completion: a
//! response that already reports `completed` is fetched immediately, an
//! acknowledgement is followed by status polling.
//!
//! UI-facing [`JobEvent`]s are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`Orchestrator::subscribe`] to receive them.

use std::sync::Arc;

use futures::future::{BoxFuture, OptionFuture};
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use upscale_core::descriptor::{JobRequest, JobSelections};
use upscale_core::error::ValidationError;
use upscale_core::job::{JobResult, JobState, ProgressEvent};
use upscale_core::naming::suggested_filename;
use upscale_core::types::JobId;

use crate::api::{SubmitResponse, UpscaleApi, UpscaleApiError};
use crate::channel::{ChannelSignal, ProgressChannel};
use crate::cleanup::{CleanupOutcome, ScheduledCleanup};
use crate::config::ClientConfig;
use crate::events::{JobEvent, JobEventKind, JobPhase};

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// User-facing reasons a job did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The selections are incomplete; nothing was submitted.
    #[error("Job is not ready: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to submit job: {0}")]
    Submission(#[source] UpscaleApiError),

    #[error("Failed to check job status: {0}")]
    Status(#[source] UpscaleApiError),

    #[error("Failed to download result: {0}")]
    Download(#[source] UpscaleApiError),

    /// The backend reported the job as failed.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The caller abandoned the job.
    #[error("Job cancelled")]
    Cancelled,
}

/// Outcome of one status check.
enum CompletionCheck {
    Ready(JobResult),
    /// Not final yet. `None` while the backend has not registered the job.
    Pending(Option<JobState>),
}

/// What prompted a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckTrigger {
    /// A completion frame; the job must exist by now.
    Sentinel,
    /// A poll tick, possibly racing the backend's job registration.
    Poll,
}

type CompletionFuture = BoxFuture<'static, Result<CompletionCheck, JobError>>;

/// Drives jobs through submission, progress tracking, artifact retrieval
/// and cleanup. Holds at most one active job.
pub struct Orchestrator {
    api: Arc<UpscaleApi>,
    config: ClientConfig,
    phase: JobPhase,
    current_job: Option<JobId>,
    pending_cleanup: Option<ScheduledCleanup>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Orchestrator {
    pub fn new(config: ClientConfig) -> Self {
        let api = Arc::new(UpscaleApi::new(config.api_url.clone()));
        Self::with_api(api, config)
    }

    /// Build an orchestrator around an existing API client.
    pub fn with_api(api: Arc<UpscaleApi>, config: ClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            config,
            phase: JobPhase::Idle,
            current_job: None,
            pending_cleanup: None,
            event_tx,
        }
    }

    /// Subscribe to UI-facing job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub fn api(&self) -> &Arc<UpscaleApi> {
        &self.api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// The job currently being driven, if any.
    pub fn current_job(&self) -> Option<&JobId> {
        self.current_job.as_ref()
    }

    /// Whether a cleanup is scheduled and has not finished yet.
    pub fn has_pending_cleanup(&self) -> bool {
        self.pending_cleanup
            .as_ref()
            .is_some_and(|cleanup| !cleanup.is_finished())
    }

    /// Run one job to completion.
    ///
    /// Returns the artifact on success. Cancelling `cancel` abandons the
    /// job: the progress channel is closed and [`JobError::Cancelled`] is
    /// returned.
    pub async fn run(
        &mut self,
        selections: &JobSelections,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        if let Err(e) = selections.validate() {
            tracing::debug!(error = %e, "Submission requested before selections were ready");
            return Err(e.into());
        }

        let job_id = JobId::generate();
        let request = selections.build(job_id.clone())?;

        self.expedite_pending_cleanup();
        self.current_job = Some(job_id.clone());

        tracing::info!(
            job_id = %job_id,
            source = %request.source().name(),
            stages = ?request.wire_scales(),
            resample_mode = %request.resample_mode(),
            progress = request.progress_enabled(),
            "Starting job",
        );

        let outcome = self.drive(&request, cancel).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %job_id,
                    filename = %result.filename,
                    bytes = result.len(),
                    "Job completed",
                );
            }
            Err(JobError::Cancelled) => {
                tracing::info!(job_id = %job_id, "Job cancelled");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                self.set_phase(&job_id, JobPhase::Failed);
                self.publish(
                    &job_id,
                    JobEventKind::Failed {
                        message: e.to_string(),
                    },
                );
            }
        }

        self.set_phase(&job_id, JobPhase::Idle);
        self.current_job = None;
        outcome
    }

    /// Wait for a scheduled cleanup to run after its grace period.
    pub async fn wait_for_cleanup(&mut self) -> Option<CleanupOutcome> {
        let cleanup = self.pending_cleanup.take()?;
        cleanup.wait().await
    }

    /// Run any scheduled cleanup immediately and wait for it.
    pub async fn shutdown(&mut self) -> Option<CleanupOutcome> {
        let cleanup = self.pending_cleanup.take()?;
        cleanup.expedite();
        cleanup.wait().await
    }

    // ---- protocol steps ----

    async fn drive(
        &mut self,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        let job_id = request.job_id();
        self.set_phase(job_id, JobPhase::Submitting);

        let mut channel = None;
        let mut channel_ready = false;
        if request.progress_enabled() {
            let mut opened = ProgressChannel::open(&self.config.ws_url, job_id.clone());
            channel_ready = tokio::select! {
                _ = cancel.cancelled() => {
                    opened.close().await;
                    return Err(JobError::Cancelled);
                }
                ready = opened.wait_ready(self.config.ready_timeout) => ready,
            };

            if channel_ready {
                self.publish(job_id, JobEventKind::ChannelReady);
            } else {
                let reason = format!(
                    "progress channel not open after {} ms",
                    self.config.ready_timeout.as_millis()
                );
                tracing::warn!(job_id = %job_id, "Submitting without live progress: {reason}");
                self.publish(job_id, JobEventKind::ChannelDegraded { reason });
            }
            channel = Some(opened);
        }

        let submitted = tokio::select! {
            _ = cancel.cancelled() => Err(JobError::Cancelled),
            result = self.api.submit(request) => result.map_err(JobError::Submission),
        };
        let ack = match submitted {
            Ok(ack) => ack,
            Err(e) => {
                if let Some(channel) = channel.as_mut() {
                    channel.close().await;
                }
                return Err(e);
            }
        };

        tracing::info!(job_id = %job_id, status = ?ack.status, "Job submitted");
        self.set_phase(job_id, JobPhase::AwaitingProgress);

        let outcome = match channel.as_mut() {
            Some(channel) => {
                self.await_progress(request, channel, channel_ready, cancel)
                    .await
            }
            None => self.complete_from_response(request, ack, cancel).await,
        };

        if let Ok(result) = &outcome {
            self.finish(result);
        }
        if let Some(channel) = channel.as_mut() {
            channel.close().await;
        }
        outcome
    }

    /// Follow the progress channel until a completion check succeeds.
    async fn await_progress(
        &mut self,
        request: &JobRequest,
        channel: &mut ProgressChannel,
        channel_ready: bool,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        let job_id = request.job_id();
        let total_stages = request.stages().len();
        let fallback_name = suggested_filename(request.source().name(), request.stages());

        let mut completing: Option<CompletionFuture> = None;
        let mut channel_live = true;
        let mut poll_timer = (!channel_ready).then(|| self.poll_timer(true));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(JobError::Cancelled),

                Some(outcome) = OptionFuture::from(completing.as_mut()), if completing.is_some() => {
                    completing = None;
                    match outcome? {
                        CompletionCheck::Ready(result) => return Ok(result),
                        CompletionCheck::Pending(state) => {
                            // Intermediate stages also report 1.0; keep polling
                            // in case the final frame never arrives.
                            tracing::debug!(job_id = %job_id, ?state, "Job not final yet, waiting");
                            self.set_phase(job_id, JobPhase::AwaitingProgress);
                            if poll_timer.is_none() {
                                poll_timer = Some(self.poll_timer(false));
                            }
                        }
                    }
                }

                signal = channel.recv(), if channel_live => match signal {
                    Some(ChannelSignal::Progress { job_id: from, event }) => {
                        if &from != job_id {
                            tracing::warn!(job_id = %job_id, from = %from, "Ignoring progress for another job");
                            continue;
                        }
                        self.publish_progress(job_id, &event, total_stages);
                        if event.is_completion() {
                            self.begin_completion(
                                &mut completing,
                                job_id,
                                &fallback_name,
                                CheckTrigger::Sentinel,
                            );
                        }
                    }
                    Some(ChannelSignal::Closed { reason, .. }) => {
                        channel_live = false;
                        self.degrade(job_id, reason, channel_ready, &mut poll_timer);
                    }
                    None => {
                        channel_live = false;
                        self.degrade(job_id, "channel ended".to_string(), channel_ready, &mut poll_timer);
                    }
                },

                _ = tick(&mut poll_timer), if completing.is_none() => {
                    self.begin_completion(
                        &mut completing,
                        job_id,
                        &fallback_name,
                        CheckTrigger::Poll,
                    );
                }
            }
        }
    }

    /// Complete a job submitted without a progress channel.
    async fn complete_from_response(
        &mut self,
        request: &JobRequest,
        ack: SubmitResponse,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        let job_id = request.job_id();
        let fallback_name = suggested_filename(request.source().name(), request.stages());

        if ack.status == Some(JobState::Failed) {
            return Err(JobError::JobFailed(ack.message.unwrap_or_default()));
        }

        if ack.is_completed() {
            self.set_phase(job_id, JobPhase::Completing);
            let filename = ack
                .filename
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(fallback_name);
            let download_url = ack.download_url;

            let api = Arc::clone(&self.api);
            let fetch = async {
                match download_url.as_deref() {
                    Some(location) => api.fetch_artifact_from(job_id, location, filename).await,
                    None => api.fetch_artifact(job_id, filename).await,
                }
            };

            return tokio::select! {
                _ = cancel.cancelled() => Err(JobError::Cancelled),
                result = fetch => result.map_err(JobError::Download),
            };
        }

        tracing::debug!(job_id = %job_id, "Submission acknowledged, polling for completion");
        let mut timer = self.poll_timer(true);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                _ = timer.tick() => {}
            }

            let check = check_completion(
                Arc::clone(&self.api),
                job_id.clone(),
                fallback_name.clone(),
                CheckTrigger::Poll,
            );
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                outcome = check => outcome?,
            };

            match outcome {
                CompletionCheck::Ready(result) => {
                    self.set_phase(job_id, JobPhase::Completing);
                    return Ok(result);
                }
                CompletionCheck::Pending(state) => {
                    tracing::debug!(job_id = %job_id, ?state, "Job not final yet");
                }
            }
        }
    }

    /// Start a completion check unless one is already in flight for this job.
    fn begin_completion(
        &mut self,
        completing: &mut Option<CompletionFuture>,
        job_id: &JobId,
        fallback_name: &str,
        trigger: CheckTrigger,
    ) {
        if completing.is_some() {
            tracing::debug!(job_id = %job_id, "Completion check already in progress");
            return;
        }
        self.set_phase(job_id, JobPhase::Completing);
        *completing = Some(Box::pin(check_completion(
            Arc::clone(&self.api),
            job_id.clone(),
            fallback_name.to_string(),
            trigger,
        )));
    }

    /// Publish the result and schedule the server-side cleanup.
    fn finish(&mut self, result: &JobResult) {
        self.publish(
            &result.job_id,
            JobEventKind::Completed {
                filename: result.filename.clone(),
                bytes: result.len(),
            },
        );
        self.pending_cleanup = Some(ScheduledCleanup::schedule(
            Arc::clone(&self.api),
            result.job_id.clone(),
            self.config.cleanup_delay,
            self.event_tx.clone(),
        ));
    }

    /// Switch to status polling after losing the progress channel. A
    /// channel that never became ready was already reported as degraded.
    fn degrade(
        &self,
        job_id: &JobId,
        reason: String,
        was_ready: bool,
        poll_timer: &mut Option<Interval>,
    ) {
        tracing::warn!(job_id = %job_id, reason = %reason, "Progress channel degraded, polling status");
        if poll_timer.is_none() {
            *poll_timer = Some(self.poll_timer(true));
        }
        if was_ready {
            self.publish(job_id, JobEventKind::ChannelDegraded { reason });
        }
    }

    /// A new job starting while the previous one still waits for its
    /// cleanup deletes the previous one right away.
    fn expedite_pending_cleanup(&mut self) {
        if let Some(cleanup) = self.pending_cleanup.take() {
            if !cleanup.is_finished() {
                tracing::debug!(job_id = %cleanup.job_id(), "Expediting previous job cleanup");
                cleanup.expedite();
            }
        }
    }

    /// Status-poll timer. With `immediate` the first tick fires right away.
    fn poll_timer(&self, immediate: bool) -> Interval {
        let period = self.config.poll_interval;
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    // ---- event publishing ----

    fn set_phase(&mut self, job_id: &JobId, phase: JobPhase) {
        if self.phase == phase {
            return;
        }
        tracing::debug!(job_id = %job_id, from = ?self.phase, to = ?phase, "Job phase changed");
        self.phase = phase;
        self.publish(job_id, JobEventKind::PhaseChanged { phase });
    }

    fn publish_progress(&self, job_id: &JobId, event: &ProgressEvent, total_stages: usize) {
        self.publish(
            job_id,
            JobEventKind::Progress {
                percent: event.percent(),
                message: event.display_message().to_string(),
                current_stage: event.current_stage(total_stages),
                total_stages,
            },
        );
    }

    fn publish(&self, job_id: &JobId, kind: JobEventKind) {
        // A send error only means nobody is listening.
        let _ = self.event_tx.send(JobEvent::new(job_id.clone(), kind));
    }
}

/// Check the job status and fetch the artifact once it is completed.
async fn check_completion(
    api: Arc<UpscaleApi>,
    job_id: JobId,
    fallback_name: String,
    trigger: CheckTrigger,
) -> Result<CompletionCheck, JobError> {
    let status = match trigger {
        CheckTrigger::Sentinel => api.job_status(&job_id).await,
        CheckTrigger::Poll => match api.job_status_if_known(&job_id).await {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                tracing::debug!(job_id = %job_id, "Job not registered by the backend yet");
                return Ok(CompletionCheck::Pending(None));
            }
            Err(e) => Err(e),
        },
    }
    .map_err(JobError::Status)?;

    match status.status {
        JobState::Completed => {
            let filename = status
                .result_filename()
                .map(str::to_string)
                .unwrap_or(fallback_name);
            let result = api
                .fetch_artifact(&job_id, filename)
                .await
                .map_err(JobError::Download)?;
            Ok(CompletionCheck::Ready(result))
        }
        JobState::Failed => Err(JobError::JobFailed(status.message)),
        state @ (JobState::Pending | JobState::Running) => Ok(CompletionCheck::Pending(Some(state))),
    }
}

/// Next tick of an optional timer; never resolves without one.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
