//! Camera permission probing
//!
//! A denied or restricted status is terminal for a scan session until the
//! user re-authorizes the app; an undetermined status lets the backend ask.

use crate::errors::ScanError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The user has not been asked yet
    NotDetermined,
    /// Blocked by policy (parental controls, MDM)
    Restricted,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::NotDetermined => "not_determined",
            PermissionStatus::Restricted => "restricted",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
    pub can_request: bool,
}

impl PermissionInfo {
    fn new(status: PermissionStatus, message: impl Into<String>, can_request: bool) -> Self {
        Self {
            status,
            message: message.into(),
            can_request,
        }
    }

    /// Fail with `PermissionDenied` when scanning cannot proceed.
    pub fn ensure_allowed(&self) -> Result<(), ScanError> {
        match self.status {
            PermissionStatus::Granted | PermissionStatus::NotDetermined => Ok(()),
            PermissionStatus::Denied | PermissionStatus::Restricted => {
                Err(ScanError::PermissionDenied(self.message.clone()))
            }
        }
    }
}

pub fn check_permission() -> PermissionStatus {
    check_permission_detailed().status
}

pub fn check_permission_detailed() -> PermissionInfo {
    #[cfg(target_os = "macos")]
    {
        macos::check()
    }

    #[cfg(target_os = "linux")]
    {
        linux::check()
    }

    #[cfg(target_os = "windows")]
    {
        windows::check()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        PermissionInfo::new(
            PermissionStatus::NotDetermined,
            "Platform not supported",
            false,
        )
    }
}

/// Probe permissions and fail fast on a terminal denial.
pub fn ensure_camera_access() -> Result<(), ScanError> {
    let info = check_permission_detailed();
    log::debug!("Camera permission: {} ({})", info.status, info.message);
    info.ensure_allowed()
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{PermissionInfo, PermissionStatus};
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::os::raw::c_char;

    // AVMediaTypeVideo
    const MEDIA_TYPE_VIDEO: &[u8] = b"vide\0";

    pub(super) fn check() -> PermissionInfo {
        let (Some(device_class), Some(string_class)) =
            (Class::get("AVCaptureDevice"), Class::get("NSString"))
        else {
            return PermissionInfo::new(
                PermissionStatus::NotDetermined,
                "AVFoundation not available",
                false,
            );
        };

        // AVAuthorizationStatus: 0 not determined, 1 restricted, 2 denied, 3 authorized
        let status: isize = unsafe {
            let media_type: *mut Object = msg_send![
                string_class,
                stringWithUTF8String: MEDIA_TYPE_VIDEO.as_ptr() as *const c_char
            ];
            msg_send![device_class, authorizationStatusForMediaType: media_type]
        };

        match status {
            3 => PermissionInfo::new(PermissionStatus::Granted, "Camera access authorized", false),
            2 => PermissionInfo::new(
                PermissionStatus::Denied,
                "Camera access denied - enable it in System Settings > Privacy & Security > Camera",
                false,
            ),
            1 => PermissionInfo::new(
                PermissionStatus::Restricted,
                "Camera access restricted by system policy",
                false,
            ),
            _ => PermissionInfo::new(
                PermissionStatus::NotDetermined,
                "Camera permission not yet requested",
                true,
            ),
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::{PermissionInfo, PermissionStatus};
    use std::fs::OpenOptions;
    use std::path::Path;

    pub(super) fn check() -> PermissionInfo {
        let device = match (0..10)
            .map(|i| format!("/dev/video{}", i))
            .find(|p| Path::new(p).exists())
        {
            Some(d) => d,
            None => {
                return PermissionInfo::new(
                    PermissionStatus::NotDetermined,
                    "No video devices found at /dev/video*",
                    false,
                )
            }
        };

        match OpenOptions::new().read(true).open(&device) {
            Ok(_) => PermissionInfo::new(
                PermissionStatus::Granted,
                format!("Camera access granted ({})", device),
                false,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionInfo::new(
                PermissionStatus::Denied,
                format!(
                    "Cannot open {} - add the user to the video group: sudo usermod -a -G video $USER",
                    device
                ),
                true,
            ),
            // Busy or transient errors are not a permission problem
            Err(e) => PermissionInfo::new(
                PermissionStatus::NotDetermined,
                format!("Could not probe {}: {}", device, e),
                true,
            ),
        }
    }
}

#[cfg(target_os = "windows")]
mod windows {
    use super::{PermissionInfo, PermissionStatus};

    // Privacy settings gate enumeration, so a successful query is the signal.
    pub(super) fn check() -> PermissionInfo {
        match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
            Ok(devices) if !devices.is_empty() => PermissionInfo::new(
                PermissionStatus::Granted,
                "Camera access granted via Windows Privacy settings",
                false,
            ),
            Ok(_) => PermissionInfo::new(
                PermissionStatus::NotDetermined,
                "No cameras found - permission may not be granted",
                true,
            ),
            Err(e) => PermissionInfo::new(
                PermissionStatus::Denied,
                format!("Camera access denied: {}", e),
                true,
            ),
        }
    }
}
