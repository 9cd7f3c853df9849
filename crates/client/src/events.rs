//! UI-facing job events.
//!
//! The orchestrator publishes these on a broadcast channel; a front end
//! subscribes to render progress, results and failures.

use chrono::Utc;
use serde::Serialize;
use upscale_core::types::{JobId, Timestamp};

/// Lifecycle phase of the job currently owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Idle,
    Submitting,
    AwaitingProgress,
    Completing,
    Failed,
}

/// A job event together with the moment it was published.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobEventKind,
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobEventKind) -> Self {
        Self {
            job_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// The orchestrator moved to a new phase for this job.
    PhaseChanged { phase: JobPhase },

    /// The progress channel opened.
    ChannelReady,

    /// The progress channel failed to open or closed early. Progress stops
    /// updating; completion falls back to status polling.
    ChannelDegraded { reason: String },

    /// Progress snapshot for display.
    Progress {
        /// Completion percentage (0-100).
        percent: u8,
        message: String,
        current_stage: usize,
        total_stages: usize,
    },

    /// The artifact was retrieved.
    Completed { filename: String, bytes: usize },

    /// The job was aborted with a user-facing error.
    Failed { message: String },

    /// Server-side state was disposed; the UI may clear its progress display.
    CleanedUp,
}
