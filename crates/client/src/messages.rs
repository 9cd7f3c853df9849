//! Progress channel frame parser.
//!
//! The backend pushes JSON text frames shaped `{"progress": f, "message": s}`.
//! Frames that do not parse, or whose fraction falls outside `[0.0, 1.0]`,
//! are rejected so that they can never be mistaken for completion.

use upscale_core::job::ProgressEvent;

/// Why a frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed progress frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Progress fraction {0} outside [0, 1]")]
    OutOfRange(f64),
}

/// Parse a progress channel text frame into a [`ProgressEvent`].
///
/// Callers should log rejected frames and continue.
pub fn parse_progress(text: &str) -> Result<ProgressEvent, MessageError> {
    let event: ProgressEvent = serde_json::from_str(text)?;
    if !event.is_in_range() {
        return Err(MessageError::OutOfRange(event.progress));
    }
    Ok(event)
}
