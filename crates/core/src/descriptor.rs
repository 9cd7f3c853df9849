//! Job descriptor construction and readiness.
//!
//! [`JobSelections`] mirrors what the user has picked so far: a source
//! image, a stage count with one factor slot per stage, a resample mode
//! and the progress flag. [`JobSelections::build`] is the only way to
//! obtain a [`JobRequest`], so a request with an unassigned stage or an
//! unsupported source can never reach the backend.

use crate::asset::{validate_image_name, SourceAsset};
use crate::error::ValidationError;
use crate::stages::{ResampleMode, ScaleFactor, MAX_STAGES};
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Whether the first `count` stage slots are all assigned.
///
/// `count` outside `[1, MAX_STAGES]` is never ready, and neither is a slot
/// list shorter than `count`.
pub fn stages_ready(count: usize, slots: &[Option<ScaleFactor>]) -> bool {
    (1..=MAX_STAGES).contains(&count)
        && slots.len() >= count
        && slots[..count].iter().all(Option::is_some)
}

// ---------------------------------------------------------------------------
// JobSelections
// ---------------------------------------------------------------------------

/// Raw, possibly incomplete user selections.
#[derive(Debug, Clone)]
pub struct JobSelections {
    source: Option<SourceAsset>,
    slots: Vec<Option<ScaleFactor>>,
    resample_mode: ResampleMode,
    progress_enabled: bool,
}

impl Default for JobSelections {
    fn default() -> Self {
        Self {
            source: None,
            slots: vec![None],
            resample_mode: ResampleMode::default(),
            progress_enabled: true,
        }
    }
}

impl JobSelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&SourceAsset> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, asset: SourceAsset) {
        self.source = Some(asset);
    }

    pub fn clear_source(&mut self) {
        self.source = None;
    }

    pub fn stage_count(&self) -> usize {
        self.slots.len()
    }

    /// Resize the stage list. New slots start unassigned; shrinking drops
    /// the trailing slots.
    pub fn set_stage_count(&mut self, count: usize) -> Result<(), ValidationError> {
        if !(1..=MAX_STAGES).contains(&count) {
            return Err(ValidationError::StageCount { count });
        }
        self.slots.resize(count, None);
        Ok(())
    }

    /// Assign the factor of stage `index` (zero-based).
    pub fn set_stage(&mut self, index: usize, factor: ScaleFactor) -> Result<(), ValidationError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ValidationError::StageIndex { index, count })?;
        *slot = Some(factor);
        Ok(())
    }

    pub fn clear_stage(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Replace all stages at once; the stage count follows `factors.len()`.
    pub fn set_stages(&mut self, factors: &[ScaleFactor]) -> Result<(), ValidationError> {
        self.set_stage_count(factors.len())?;
        self.slots = factors.iter().copied().map(Some).collect();
        Ok(())
    }

    pub fn slots(&self) -> &[Option<ScaleFactor>] {
        &self.slots
    }

    pub fn resample_mode(&self) -> ResampleMode {
        self.resample_mode
    }

    pub fn set_resample_mode(&mut self, mode: ResampleMode) {
        self.resample_mode = mode;
    }

    pub fn progress_enabled(&self) -> bool {
        self.progress_enabled
    }

    pub fn set_progress_enabled(&mut self, enabled: bool) {
        self.progress_enabled = enabled;
    }

    /// Pure readiness predicate used to enable submission.
    pub fn is_ready(&self) -> bool {
        self.source.is_some() && stages_ready(self.slots.len(), &self.slots)
    }

    /// Like [`is_ready`](Self::is_ready), but names the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let source = self.source.as_ref().ok_or(ValidationError::MissingSource)?;
        validate_image_name(source.name())?;

        let count = self.slots.len();
        if !(1..=MAX_STAGES).contains(&count) {
            return Err(ValidationError::StageCount { count });
        }
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            return Err(ValidationError::UnassignedStage { index });
        }
        Ok(())
    }

    /// Freeze the selections into a [`JobRequest`] for `job_id`.
    pub fn build(&self, job_id: JobId) -> Result<JobRequest, ValidationError> {
        self.validate()?;
        let source = self.source.clone().ok_or(ValidationError::MissingSource)?;
        let stages = self.slots.iter().flatten().copied().collect();

        Ok(JobRequest {
            job_id,
            source,
            stages,
            resample_mode: self.resample_mode,
            progress_enabled: self.progress_enabled,
        })
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Immutable description of one submitted job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    job_id: JobId,
    source: SourceAsset,
    stages: Vec<ScaleFactor>,
    resample_mode: ResampleMode,
    progress_enabled: bool,
}

impl JobRequest {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn source(&self) -> &SourceAsset {
        &self.source
    }

    /// Ordered, non-empty stage list.
    pub fn stages(&self) -> &[ScaleFactor] {
        &self.stages
    }

    pub fn resample_mode(&self) -> ResampleMode {
        self.resample_mode
    }

    pub fn progress_enabled(&self) -> bool {
        self.progress_enabled
    }

    /// Stage factors as sent to the backend (`["4", "2"]`).
    pub fn wire_scales(&self) -> Vec<&'static str> {
        self.stages.iter().map(ScaleFactor::wire_value).collect()
    }

    /// Combined scale of the whole pipeline.
    pub fn total_multiplier(&self) -> u32 {
        self.stages.iter().map(ScaleFactor::multiplier).product()
    }
}
