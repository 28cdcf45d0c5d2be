use std::path::Path;

use image::ImageFormat;

use crate::config::AppConfig;
use crate::error::TranslateError;

/// One image as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, inferring its content type from the file extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let content_type = ImageFormat::from_path(path)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::new(file_name, content_type, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject payloads the service would refuse, before any network call.
    pub fn validate(&self, config: &AppConfig) -> Result<(), TranslateError> {
        if !config.allows_content_type(&self.content_type) {
            return Err(TranslateError::InvalidPayload(format!(
                "{}: unsupported content type '{}' (allowed: {})",
                self.file_name,
                self.content_type,
                config.allowed_content_types.join(", ")
            )));
        }

        if self.is_empty() {
            return Err(TranslateError::InvalidPayload(format!(
                "{}: file is empty",
                self.file_name
            )));
        }

        if self.len() > config.max_payload_bytes {
            return Err(TranslateError::InvalidPayload(format!(
                "{}: {} bytes exceeds the {} byte limit",
                self.file_name,
                self.len(),
                config.max_payload_bytes
            )));
        }

        // Declared type must agree with the actual bytes.
        let sniffed = image::guess_format(&self.bytes).map_err(|_| {
            TranslateError::InvalidPayload(format!(
                "{}: content is not a recognizable image",
                self.file_name
            ))
        })?;
        if !config.allows_content_type(sniffed.to_mime_type()) {
            return Err(TranslateError::InvalidPayload(format!(
                "{}: content is {} but only {} are accepted",
                self.file_name,
                sniffed.to_mime_type(),
                config.allowed_content_types.join(", ")
            )));
        }

        Ok(())
    }
}
