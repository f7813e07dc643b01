use thiserror::Error;

/// Errors raised by the camera, detection and capture layers.
///
/// The stability tracker itself is infallible; everything here belongs to the
/// plumbing around it.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Camera not found: {0}")]
    DeviceNotFound(String),
    #[error("Camera initialization error: {0}")]
    InitializationError(String),
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("Capture error: {0}")]
    CaptureError(String),
    #[error("Detection error: {0}")]
    DetectionError(String),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl ScanError {
    /// Errors after which the session cannot continue until the user acts
    /// (grants access, plugs a camera in).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanError::PermissionDenied(_) | ScanError::DeviceNotFound(_)
        )
    }
}

impl From<image::ImageError> for ScanError {
    fn from(e: image::ImageError) -> Self {
        ScanError::EncodingError(e.to_string())
    }
}

impl From<nokhwa::NokhwaError> for ScanError {
    fn from(e: nokhwa::NokhwaError) -> Self {
        ScanError::StreamError(e.to_string())
    }
}
