//! Scanner configuration
//!
//! Loaded from `crabscan.toml`; every section and field falls back to its
//! default, so a partial file is valid. [`ScannerConfig::load_layered`] also
//! applies `CRABSCAN__<SECTION>__<KEY>` environment overrides.

use crate::capture::PhotoSettings;
use crate::detection::{DetectorAccuracy, LuminanceQuadDetector};
use crate::errors::ScanError;
use crate::overlay::OverlayStyle;
use crate::sampler::{FrameSampler, DEFAULT_FREQUENCY, DEFAULT_WRAP};
use crate::stability::{StabilityPolicy, DEFAULT_MARGIN, DEFAULT_THRESHOLD};
use crate::types::{CameraFormat, CameraPosition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CRABSCAN";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScannerConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub auto_capture: AutoCaptureConfig,
    pub photo: PhotoSettings,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub overlay: OverlayStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Explicit device; when unset the first camera facing `preferred_position` is used
    pub device_id: Option<String>,
    pub preferred_position: CameraPosition,
    /// Requested resolution [width, height]
    pub resolution: [u32; 2],
    pub fps: u32,
    /// Landscape sensor shown in a portrait view
    pub rotate_to_portrait: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Run detection on every Nth frame
    pub frequency: u32,
    pub counter_wrap: u32,
    pub accuracy: DetectorAccuracy,
    pub min_area_fraction: f64,
    pub min_rectangularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptureConfig {
    pub enabled: bool,
    pub margin: f64,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_directory: String,
    pub save_captures: bool,
    pub organize_by_date: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pending events kept before the oldest is dropped
    pub event_queue_capacity: usize,
    pub open_timeout_ms: u64,
    pub join_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            preferred_position: CameraPosition::Back,
            resolution: [1280, 720],
            fps: 30,
            rotate_to_portrait: false,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            counter_wrap: DEFAULT_WRAP,
            accuracy: DetectorAccuracy::High,
            min_area_fraction: 0.05,
            min_rectangularity: 0.8,
        }
    }
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            margin: DEFAULT_MARGIN,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_directory: "./scans".to_string(),
            save_captures: true,
            organize_by_date: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 64,
            open_timeout_ms: 5000,
            join_timeout_ms: 1000,
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScanError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: ScannerConfig = toml::from_str(&contents)
            .map_err(|e| ScanError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScanError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ScanError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// File first, then `CRABSCAN__SECTION__KEY` environment variables.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ScanError::ConfigError(format!("Failed to load {:?}: {}", path, e)))?;

        let config: ScannerConfig = settings
            .try_deserialize()
            .map_err(|e| ScanError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate().map_err(ScanError::ConfigError)?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("crabscan.toml")
    }

    pub fn load_or_default() -> Self {
        Self::load_layered(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.camera.resolution[0] == 0 || self.camera.resolution[1] == 0 {
            return Err("Invalid camera resolution".to_string());
        }
        if self.camera.fps == 0 || self.camera.fps > 240 {
            return Err("Invalid camera FPS (must be 1-240)".to_string());
        }

        if self.detection.frequency == 0 {
            return Err("Detection frequency must be at least 1".to_string());
        }
        if self.detection.counter_wrap < self.detection.frequency {
            return Err("Frame counter wrap must not be below the detection frequency".to_string());
        }
        if !(0.0..=1.0).contains(&self.detection.min_area_fraction) {
            return Err("Minimum area fraction must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.detection.min_rectangularity) {
            return Err("Minimum rectangularity must be between 0.0 and 1.0".to_string());
        }

        self.stability_policy().validate()?;
        self.photo.validate()?;

        if self.storage.save_captures && self.storage.output_directory.trim().is_empty() {
            return Err("Output directory is required when saving captures".to_string());
        }
        if self.session.event_queue_capacity == 0 {
            return Err("Event queue capacity must be at least 1".to_string());
        }

        Ok(())
    }

    pub fn stability_policy(&self) -> StabilityPolicy {
        StabilityPolicy::new(self.auto_capture.margin, self.auto_capture.threshold)
    }

    pub fn sampler(&self) -> FrameSampler {
        FrameSampler::new(self.detection.frequency, self.detection.counter_wrap)
    }

    pub fn detector(&self) -> LuminanceQuadDetector {
        LuminanceQuadDetector {
            accuracy: self.detection.accuracy,
            min_area_fraction: self.detection.min_area_fraction,
            min_rectangularity: self.detection.min_rectangularity,
        }
    }

    pub fn camera_format(&self) -> CameraFormat {
        CameraFormat::new(
            self.camera.resolution[0],
            self.camera.resolution[1],
            self.camera.fps as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert_eq!(config.auto_capture.threshold, 25);
        assert_eq!(config.auto_capture.margin, 50.0);
        assert_eq!(config.detection.frequency, 5);
        assert!(!config.auto_capture.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = ScannerConfig::default();
        bad.camera.resolution = [0, 720];
        assert!(bad.validate().is_err());

        let mut bad = ScannerConfig::default();
        bad.auto_capture.threshold = 0;
        assert!(bad.validate().is_err());

        let mut bad = ScannerConfig::default();
        bad.detection.min_rectangularity = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = ScannerConfig::default();
        bad.photo.jpeg_quality = 101;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&ScannerConfig::default()).unwrap();
        for section in [
            "[camera]",
            "[detection]",
            "[auto_capture]",
            "[photo]",
            "[storage]",
            "[session]",
            "[overlay]",
        ] {
            assert!(toml_string.contains(section), "missing {}", section);
        }
        assert!(toml_string.contains("preferred_position = \"back\""));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ScannerConfig = toml::from_str("[auto_capture]\nenabled = true\n").unwrap();
        assert!(config.auto_capture.enabled);
        assert_eq!(config.auto_capture.threshold, 25);
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = ScannerConfig::load_from_file("nonexistent_crabscan.toml").unwrap();
        assert_eq!(config, ScannerConfig::default());
    }

    #[test]
    fn test_derived_components() {
        let mut config = ScannerConfig::default();
        config.detection.frequency = 3;
        config.detection.counter_wrap = 10;
        config.detection.accuracy = DetectorAccuracy::Low;

        let sampler = config.sampler();
        assert_eq!((sampler.frequency(), sampler.wrap()), (3, 12));
        assert_eq!(config.detector().accuracy, DetectorAccuracy::Low);
        assert_eq!(config.stability_policy(), StabilityPolicy::default());
    }
}
