//! Still photo capture
//!
//! The stability tracker only decides *when* to capture. This module turns a
//! frame into an encoded photo and writes it out.

use crate::errors::ScanError;
use crate::geometry::Quad;
use crate::types::CameraFrame;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFormat {
    #[default]
    Jpeg,
    Png,
}

impl PhotoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpg",
            PhotoFormat::Png => "png",
        }
    }
}

/// How a still is encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoSettings {
    pub format: PhotoFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Keep the full sensor resolution
    pub high_resolution: bool,
    /// Long edge limit when `high_resolution` is off
    pub max_dimension: u32,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            format: PhotoFormat::Jpeg,
            jpeg_quality: 95,
            high_resolution: true,
            max_dimension: 1280,
        }
    }
}

impl PhotoSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if !self.high_resolution && self.max_dimension == 0 {
            return Err("Max photo dimension must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureReason {
    /// Fired by the stability tracker
    Auto,
    /// Requested by the user
    Manual,
}

/// Downstream side of a capture decision.
///
/// Called exactly once per capture; the implementation owns whatever
/// asynchronous image handling follows.
pub trait CaptureTrigger {
    fn request_capture(&mut self, reason: CaptureReason);
}

impl<F> CaptureTrigger for F
where
    F: FnMut(CaptureReason),
{
    fn request_capture(&mut self, reason: CaptureReason) {
        self(reason)
    }
}

/// An encoded still
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub reason: CaptureReason,
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    pub format: PhotoFormat,
    /// Detected document outline, in source image coordinates
    pub quad: Option<Quad>,
    pub saved_path: Option<PathBuf>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl CapturedPhoto {
    pub fn from_frame(
        frame: &CameraFrame,
        settings: &PhotoSettings,
        reason: CaptureReason,
        quad: Option<Quad>,
    ) -> Result<Self, ScanError> {
        let encoded = encode_photo(frame, settings)?;
        log::debug!(
            "Encoded {:?} photo {}x{} ({} bytes)",
            reason,
            encoded.width,
            encoded.height,
            encoded.data.len()
        );

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            captured_at: Utc::now(),
            reason,
            device_id: frame.device_id.clone(),
            width: encoded.width,
            height: encoded.height,
            format: encoded.format,
            quad,
            saved_path: None,
            data: encoded.data,
        })
    }

    /// `scan_<yyyymmdd>_<hhmmss>_<id prefix>.<ext>`
    pub fn file_name(&self) -> String {
        let short_id: String = self.id.chars().take(8).collect();
        format!(
            "scan_{}_{}.{}",
            self.captured_at.format("%Y%m%d_%H%M%S"),
            short_id,
            self.format.extension()
        )
    }

    /// Write the photo under `dir`, optionally inside a `YYYY-MM-DD` folder.
    pub fn save_to_dir<P: AsRef<Path>>(
        &mut self,
        dir: P,
        organize_by_date: bool,
    ) -> Result<PathBuf, ScanError> {
        let mut target = dir.as_ref().to_path_buf();
        if organize_by_date {
            target.push(self.captured_at.format("%Y-%m-%d").to_string());
        }
        fs::create_dir_all(&target)?;

        target.push(self.file_name());
        fs::write(&target, &self.data)?;

        log::info!("Saved photo to {:?}", target);
        self.saved_path = Some(target.clone());
        Ok(target)
    }
}

/// Encoded image bytes plus the dimensions actually written
#[derive(Debug, Clone)]
pub struct EncodedPhoto {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PhotoFormat,
}

/// Encode an RGB8 frame with the given settings.
pub fn encode_photo(frame: &CameraFrame, settings: &PhotoSettings) -> Result<EncodedPhoto, ScanError> {
    let image = frame_to_image(frame)?;
    let image = if settings.high_resolution {
        image
    } else {
        downscale(image, settings.max_dimension)
    };

    let data = encode(&image, settings)?;
    Ok(EncodedPhoto {
        width: image.width(),
        height: image.height(),
        format: settings.format,
        data,
    })
}

fn frame_to_image(frame: &CameraFrame) -> Result<DynamicImage, ScanError> {
    if !frame.is_valid() {
        return Err(ScanError::CaptureError(format!(
            "frame {} is empty",
            frame.id
        )));
    }
    RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            ScanError::CaptureError(format!(
                "frame {} is too small for {}x{} RGB8",
                frame.id, frame.width, frame.height
            ))
        })
}

fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode(image: &DynamicImage, settings: &PhotoSettings) -> Result<Vec<u8>, ScanError> {
    let mut buf = Vec::new();
    match settings.format {
        PhotoFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, settings.jpeg_quality);
            image.write_with_encoder(encoder)?;
        }
        PhotoFormat::Png => {
            let encoder = PngEncoder::new(&mut buf);
            image.write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}
