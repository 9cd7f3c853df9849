//! Source images submitted for transformation.

use crate::error::ValidationError;

/// Image file extensions accepted as job input (compared case-insensitively).
pub const IMAGE_FORMATS: &[&str] = &[".png", ".jpg", ".jpeg", ".tiff", ".bmp", ".gif"];

/// A named binary payload selected as the job input.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceAsset {
    name: String,
    bytes: Vec<u8>,
}

impl SourceAsset {
    /// Wrap a payload, rejecting names outside [`IMAGE_FORMATS`].
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_image_name(&name)?;
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type announced for the upload; the backend rejects anything
    /// that is not `image/*`.
    pub fn mime_type(&self) -> &'static str {
        match extension(&self.name).as_deref() {
            Some(".png") => "image/png",
            Some(".jpg" | ".jpeg") => "image/jpeg",
            Some(".tiff") => "image/tiff",
            Some(".bmp") => "image/bmp",
            Some(".gif") => "image/gif",
            _ => "application/octet-stream",
        }
    }
}

impl std::fmt::Debug for SourceAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAsset")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Lower-cased extension including the leading dot, if the name has one.
pub fn extension(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    Some(name[idx..].to_ascii_lowercase())
}

/// Whether `name` carries one of the supported image extensions.
pub fn is_supported_image(name: &str) -> bool {
    extension(name).is_some_and(|ext| IMAGE_FORMATS.contains(&ext.as_str()))
}

pub fn validate_image_name(name: &str) -> Result<(), ValidationError> {
    if is_supported_image(name) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFormat {
            name: name.to_string(),
            allowed: IMAGE_FORMATS.join(", "),
        })
    }
}
