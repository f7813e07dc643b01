//! crabscan: live document detection and stability-gated auto-capture
//!
//! Frames from a camera are sampled, searched for a document outline, and
//! the outline is exposed as overlay data. With auto-capture on, a photo is
//! taken once the outline has stayed inside a tolerance region for enough
//! consecutive detections.
//!
//! # Usage
//! ```toml
//! [dependencies]
//! crabscan = "0.3"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(crabscan::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
//!
//! Without Tauri, drive a [`ScanSession`] directly or feed frames to a
//! [`DocumentScanner`] yourself.
pub mod capture;
pub mod commands;
pub mod config;
pub mod detection;
pub mod errors;
pub mod geometry;
pub mod invariant_ppt;
pub mod overlay;
pub mod permissions;
pub mod platform;
pub mod sampler;
pub mod scanner;
pub mod session;
pub mod stability;
pub mod types;

// Synthetic frames and scripted sources for offline testing
pub mod testing;

pub use capture::{CaptureReason, CaptureTrigger, CapturedPhoto, PhotoFormat, PhotoSettings};
pub use crate::config::ScannerConfig;
pub use detection::{DetectorAccuracy, LuminanceQuadDetector, QuadDetector};
pub use errors::ScanError;
pub use geometry::{Point, Quad, Rect, ViewSize, ViewTransform};
pub use scanner::{DocumentScanner, FrameOutcome};
pub use session::{ScanEvent, ScanSession, ScanStats, ScanStatus, SessionState};
pub use stability::{Decision, StabilityPolicy, StabilityState, StabilityTracker};
pub use types::{CameraDeviceInfo, CameraFormat, CameraFrame, CameraPosition, Platform};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the crabscan plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("crabscan")
        .invoke_handler(tauri::generate_handler![
            // Scanning
            commands::scan::start_scan,
            commands::scan::stop_scan,
            commands::scan::set_auto_capture,
            commands::scan::get_scan_status,
            commands::scan::poll_scan_event,
            commands::scan::request_manual_capture,
            commands::scan::set_scan_view_size,
            commands::scan::list_scan_cameras,
            // Permissions
            commands::permissions::check_scan_permission,
            // Configuration
            commands::config::get_scan_config,
            commands::config::update_scan_config,
            commands::config::reset_scan_config,
        ])
        .build()
}

pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging, defaulting to `crabscan=info`
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabscan=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
}
