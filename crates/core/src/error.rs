use crate::stages::MAX_STAGES;

/// Reasons a set of job selections cannot be turned into a submittable
/// [`JobRequest`](crate::descriptor::JobRequest).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No source image selected")]
    MissingSource,

    #[error("Unsupported image format '{name}'. Must be one of: {allowed}")]
    UnsupportedFormat { name: String, allowed: String },

    #[error("Stage count {count} out of range (must be 1..={max})", max = MAX_STAGES)]
    StageCount { count: usize },

    #[error("Stage {index} has no scale factor assigned")]
    UnassignedStage { index: usize },

    #[error("Stage index {index} is beyond the configured stage count {count}")]
    StageIndex { index: usize, count: usize },

    #[error("Invalid scale factor '{0}'")]
    InvalidFactor(String),

    #[error("Invalid resample mode '{0}'")]
    InvalidResampleMode(String),
}
