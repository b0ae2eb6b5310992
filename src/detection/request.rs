use bytes::Bytes;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Image payload is empty")]
    EmptyPayload,
    #[error("Failed to read image {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
}

/// One image to analyze. Immutable once built; the payload is shared, not
/// copied, when the request moves onto the blocking pool.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    payload: Bytes,
    media_type: String,
    file_name: String,
}

impl DetectionRequest {
    pub fn new(
        payload: impl Into<Bytes>,
        media_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(RequestError::EmptyPayload);
        }

        Ok(Self {
            payload,
            media_type: media_type.into(),
            file_name: file_name.into(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, RequestError> {
        let payload = std::fs::read(path).map_err(|source| RequestError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Self::new(payload, media_type_for(path), file_name)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

pub fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
