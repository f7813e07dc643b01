//! Core camera types shared by the scanner, the session and the commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
    Unknown,
}

impl Platform {
    /// Detect the platform the crate was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOS => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }
}

/// Which way a camera faces, when the backend reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Back,
    Front,
    External,
    #[default]
    Unknown,
}

/// Requested or supported capture format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub format_type: String,
}

impl CameraFormat {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        Self {
            width,
            height,
            fps,
            format_type: "RGB8".to_string(),
        }
    }

    pub fn with_format_type(mut self, format_type: String) -> Self {
        self.format_type = format_type;
        self
    }

    /// 1920x1080 at 30fps
    pub fn hd() -> Self {
        Self::new(1920, 1080, 30.0)
    }

    /// 1280x720 at 30fps, the default preview format
    pub fn standard() -> Self {
        Self::new(1280, 720, 30.0)
    }

    /// 640x480 at 30fps
    pub fn low() -> Self {
        Self::new(640, 480, 30.0)
    }
}

/// A camera as reported by device discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDeviceInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub position: CameraPosition,
    pub is_available: bool,
    pub supports_formats: Vec<CameraFormat>,
}

impl CameraDeviceInfo {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            description: None,
            position: CameraPosition::Unknown,
            is_available: true,
            supports_formats: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_position(mut self, position: CameraPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_formats(mut self, formats: Vec<CameraFormat>) -> Self {
        self.supports_formats = formats;
        self
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.is_available = available;
        self
    }
}

/// One decoded camera frame, tightly packed RGB8
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub id: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub size_bytes: usize,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, device_id: String) -> Self {
        let size_bytes = data.len();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data,
            width,
            height,
            format: "RGB8".to_string(),
            timestamp: Utc::now(),
            device_id,
            size_bytes,
        }
    }

    pub fn with_format(mut self, format: String) -> Self {
        self.format = format;
        self
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }

    /// Number of bytes an RGB8 buffer of this size must hold
    pub fn expected_rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}
