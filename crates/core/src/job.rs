//! Job status, progress and result types.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Fallback status text when a progress event carries none.
pub const DEFAULT_PROGRESS_MESSAGE: &str = "Processing...";

// ---------------------------------------------------------------------------
// JobState / JobStatus
// ---------------------------------------------------------------------------

/// Server-side state of a job.
///
/// The backend's own spellings (`accepted`, `processing`, `error`) are
/// accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[serde(alias = "accepted", alias = "queued")]
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Polled status snapshot returned by `GET /job/{jobId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<JobId>,
    pub status: JobState,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    /// Suggested download name; only meaningful once completed.
    #[serde(default)]
    pub filename: String,
}

impl JobStatus {
    /// The result filename, if the backend provided a non-empty one.
    pub fn result_filename(&self) -> Option<&str> {
        Some(self.filename.as_str()).filter(|name| !name.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// One progress frame pushed over the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f64,
    #[serde(default)]
    pub message: String,
}

impl ProgressEvent {
    pub fn new(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress,
            message: message.into(),
        }
    }

    /// Whether the fraction is a finite value inside `[0.0, 1.0]`.
    pub fn is_in_range(&self) -> bool {
        self.progress.is_finite() && (0.0..=1.0).contains(&self.progress)
    }

    /// The backend emits exactly `1.0` when a job (or a stage) finishes.
    #[allow(clippy::float_cmp)]
    pub fn is_completion(&self) -> bool {
        self.progress == 1.0
    }

    /// Progress as a whole percentage, `0..=100`.
    pub fn percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// The stage the pipeline is currently in, `0..=total_stages`.
    pub fn current_stage(&self, total_stages: usize) -> usize {
        let stage = (self.progress.clamp(0.0, 1.0) * total_stages as f64).ceil() as usize;
        stage.min(total_stages)
    }

    pub fn display_message(&self) -> &str {
        if self.message.trim().is_empty() {
            DEFAULT_PROGRESS_MESSAGE
        } else {
            &self.message
        }
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// The retrieved artifact of a completed job.
#[derive(Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub filename: String,
    pub data: Vec<u8>,
}

impl JobResult {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobResult")
            .field("job_id", &self.job_id)
            .field("filename", &self.filename)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_backend_spellings() {
        let json = r#"{"job_id":"a","status":"processing","progress":0.25,"message":"m","filename":""}"#;
        let status: JobStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, JobState::Running);
        assert_eq!(status.job_id, Some(JobId::from("a")));
        assert_eq!(status.result_filename(), None);

        let json = r#"{"status":"error","message":"boom"}"#;
        let status: JobStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, JobState::Failed);
        assert_eq!(status.progress, 0.0);
        assert_eq!(status.message, "boom");
    }

    #[test]
    fn status_accepts_camel_case_job_id() {
        let json = r#"{"jobId":"b","status":"completed","progress":1.0,"message":"","filename":"cat (x4 x2).png"}"#;
        let status: JobStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.job_id, Some(JobId::from("b")));
        assert_eq!(status.result_filename(), Some("cat (x4 x2).png"));
        assert!(status.status.is_terminal());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let json = r#"{"status":"exploded"}"#;
        assert!(serde_json::from_str::<JobStatus>(json).is_err());
    }

    #[test]
    fn completion_is_exact_sentinel() {
        assert!(ProgressEvent::new(1.0, "done").is_completion());
        assert!(!ProgressEvent::new(0.999_999, "almost").is_completion());
        assert!(!ProgressEvent::new(0.5, "half").is_completion());
    }

    #[test]
    fn range_check_rejects_out_of_domain_values() {
        assert!(ProgressEvent::new(0.0, "").is_in_range());
        assert!(ProgressEvent::new(1.0, "").is_in_range());
        assert!(!ProgressEvent::new(1.5, "").is_in_range());
        assert!(!ProgressEvent::new(-0.1, "").is_in_range());
        assert!(!ProgressEvent::new(f64::NAN, "").is_in_range());
    }

    #[test]
    fn percent_and_stage_snapshot() {
        let event = ProgressEvent::new(0.5, "half");
        assert_eq!(event.percent(), 50);
        assert_eq!(event.current_stage(2), 1);
        assert_eq!(event.current_stage(3), 2);

        let start = ProgressEvent::new(0.0, "");
        assert_eq!(start.current_stage(4), 0);
        assert_eq!(start.display_message(), DEFAULT_PROGRESS_MESSAGE);

        let done = ProgressEvent::new(1.0, "done");
        assert_eq!(done.percent(), 100);
        assert_eq!(done.current_stage(2), 2);
    }
}
