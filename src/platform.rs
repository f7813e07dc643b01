//! Camera access
//!
//! [`FrameSource`] is what the scan session pulls frames from. The real
//! implementation wraps a nokhwa camera; tests use scripted sources.

use crate::errors::ScanError;
use crate::types::{CameraDeviceInfo, CameraFormat, CameraFrame, CameraPosition};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

/// A stream of RGB8 frames.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), ScanError>;

    /// Block until the next frame. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<CameraFrame>, ScanError>;

    fn stop(&mut self) -> Result<(), ScanError>;

    fn device_id(&self) -> &str;
}

/// List cameras visible to the native backend
pub fn list_cameras() -> Result<Vec<CameraDeviceInfo>, ScanError> {
    let cameras = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| ScanError::InitializationError(format!("Failed to query cameras: {}", e)))?;

    let devices = cameras
        .into_iter()
        .map(|info| {
            let name = info.human_name();
            CameraDeviceInfo::new(info.index().to_string(), name.clone())
                .with_description(info.description().to_string())
                .with_position(position_from_name(&name))
        })
        .collect::<Vec<_>>();

    log::debug!("Found {} camera(s)", devices.len());
    Ok(devices)
}

/// Best-effort facing guess from the device name.
pub fn position_from_name(name: &str) -> CameraPosition {
    let name = name.to_lowercase();
    if name.contains("back") || name.contains("rear") || name.contains("environment") {
        CameraPosition::Back
    } else if name.contains("front") || name.contains("facetime") || name.contains("user") {
        CameraPosition::Front
    } else if name.contains("usb") || name.contains("external") {
        CameraPosition::External
    } else {
        CameraPosition::Unknown
    }
}

/// Pick the camera to scan with.
///
/// An explicit id must exist. Otherwise the first camera facing `preferred`
/// wins, falling back to the first camera listed.
pub fn select_camera(
    devices: &[CameraDeviceInfo],
    device_id: Option<&str>,
    preferred: CameraPosition,
) -> Result<CameraDeviceInfo, ScanError> {
    if let Some(id) = device_id {
        return devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| ScanError::DeviceNotFound(format!("no camera with id {}", id)));
    }

    let available: Vec<&CameraDeviceInfo> = devices.iter().filter(|d| d.is_available).collect();
    available
        .iter()
        .find(|d| d.position == preferred)
        .or_else(|| available.first())
        .map(|d| (*d).clone())
        .ok_or_else(|| ScanError::DeviceNotFound("no camera found".to_string()))
}

/// nokhwa-backed camera
pub struct NokhwaCamera {
    camera: Camera,
    device_id: String,
}

impl NokhwaCamera {
    pub fn open(device_id: &str, format: &CameraFormat) -> Result<Self, ScanError> {
        let index = device_id
            .parse::<u32>()
            .map(CameraIndex::Index)
            .unwrap_or_else(|_| CameraIndex::String(device_id.to_string()));

        let wanted = nokhwa::utils::CameraFormat::new(
            Resolution::new(format.width, format.height),
            FrameFormat::MJPEG,
            format.fps.round().max(1.0) as u32,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let camera = Camera::new(index, requested).map_err(|e| {
            ScanError::InitializationError(format!("Failed to open camera {}: {}", device_id, e))
        })?;

        log::info!("Opened camera {} at {:?}", device_id, camera.camera_format());
        Ok(Self {
            camera,
            device_id: device_id.to_string(),
        })
    }
}

impl FrameSource for NokhwaCamera {
    fn start(&mut self) -> Result<(), ScanError> {
        self.camera
            .open_stream()
            .map_err(|e| ScanError::StreamError(format!("Failed to start stream: {}", e)))
    }

    fn next_frame(&mut self) -> Result<Option<CameraFrame>, ScanError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| ScanError::CaptureError(format!("Failed to read frame: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| ScanError::CaptureError(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        Ok(Some(CameraFrame::new(
            decoded.into_raw(),
            width,
            height,
            self.device_id.clone(),
        )))
    }

    fn stop(&mut self) -> Result<(), ScanError> {
        self.camera
            .stop_stream()
            .map_err(|e| ScanError::StreamError(format!("Failed to stop stream: {}", e)))
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<CameraDeviceInfo> {
        vec![
            CameraDeviceInfo::new("0".into(), "FaceTime HD Camera".into())
                .with_position(CameraPosition::Front),
            CameraDeviceInfo::new("1".into(), "Rear Camera".into())
                .with_position(CameraPosition::Back),
        ]
    }

    #[test]
    fn test_select_prefers_position() {
        let cam = select_camera(&devices(), None, CameraPosition::Back).unwrap();
        assert_eq!(cam.id, "1");
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let cam = select_camera(&devices(), None, CameraPosition::External).unwrap();
        assert_eq!(cam.id, "0");
    }

    #[test]
    fn test_select_unknown_id() {
        let err = select_camera(&devices(), Some("9"), CameraPosition::Back).unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn test_select_from_empty_list() {
        let err = select_camera(&[], None, CameraPosition::Back).unwrap_err();
        assert!(matches!(err, ScanError::DeviceNotFound(_)));
    }

    #[test]
    fn test_position_from_name() {
        assert_eq!(position_from_name("Back Wide Camera"), CameraPosition::Back);
        assert_eq!(position_from_name("FaceTime HD"), CameraPosition::Front);
        assert_eq!(position_from_name("USB Video Device"), CameraPosition::External);
        assert_eq!(position_from_name("Integrated"), CameraPosition::Unknown);
    }
}
