//! Document quad detection
//!
//! [`QuadDetector`] is the seam for rectangle detection. Platform detectors,
//! test doubles and plain closures all plug in here. The bundled
//! [`LuminanceQuadDetector`] finds a bright sheet on a darker background:
//! Otsu threshold, largest bright component, extreme-point corners, then a
//! rectangularity check so blobs are rejected.

use crate::errors::ScanError;
use crate::geometry::{Point, Quad};
use crate::types::CameraFrame;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};

/// Finds at most one document quad per frame, in image pixel coordinates.
///
/// `Ok(None)` means nothing was found in this frame. Errors are reserved for
/// frames that cannot be read at all.
pub trait QuadDetector: Send {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<Quad>, ScanError>;
}

impl<F> QuadDetector for F
where
    F: FnMut(&CameraFrame) -> Result<Option<Quad>, ScanError> + Send,
{
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<Quad>, ScanError> {
        self(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorAccuracy {
    /// Detect on a half-resolution copy of the frame
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LuminanceQuadDetector {
    pub accuracy: DetectorAccuracy,
    /// Smallest component, as a fraction of the frame area, worth reporting
    pub min_area_fraction: f64,
    /// Component area over quad area below which the shape is not a sheet
    pub min_rectangularity: f64,
}

impl Default for LuminanceQuadDetector {
    fn default() -> Self {
        Self {
            accuracy: DetectorAccuracy::High,
            min_area_fraction: 0.05,
            min_rectangularity: 0.8,
        }
    }
}

impl LuminanceQuadDetector {
    pub fn new(accuracy: DetectorAccuracy) -> Self {
        Self {
            accuracy,
            ..Self::default()
        }
    }

    fn luma(&self, frame: &CameraFrame) -> Result<GrayImage, ScanError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ScanError::DetectionError(format!(
                "frame {} has zero size",
                frame.id
            )));
        }
        if frame.data.len() != frame.expected_rgb_len() {
            return Err(ScanError::DetectionError(format!(
                "frame {} holds {} bytes, expected {} for {}x{} RGB8",
                frame.id,
                frame.data.len(),
                frame.expected_rgb_len(),
                frame.width,
                frame.height
            )));
        }

        let rgb = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, &frame.data[..])
            .ok_or_else(|| ScanError::DetectionError("frame buffer too small".to_string()))?;
        let gray = imageops::grayscale(&rgb);

        match self.accuracy {
            DetectorAccuracy::High => Ok(gray),
            DetectorAccuracy::Low => {
                let w = (frame.width / 2).max(1);
                let h = (frame.height / 2).max(1);
                Ok(imageops::resize(&gray, w, h, FilterType::Triangle))
            }
        }
    }
}

impl QuadDetector for LuminanceQuadDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<Quad>, ScanError> {
        let gray = self.luma(frame)?;
        let (w, h) = gray.dimensions();

        let threshold = match otsu_threshold(gray.as_raw()) {
            Some(t) => t,
            None => return Ok(None),
        };

        let component = match largest_bright_component(&gray, threshold) {
            Some(c) => c,
            None => return Ok(None),
        };

        let frame_area = w as f64 * h as f64;
        if (component.area as f64) < self.min_area_fraction * frame_area {
            log::trace!(
                "Largest component covers {} px, below the minimum",
                component.area
            );
            return Ok(None);
        }

        let quad = component.quad();
        if !quad.is_convex() {
            return Ok(None);
        }
        let rectangularity = component.area as f64 / quad.area();
        if rectangularity < self.min_rectangularity {
            log::trace!("Rejected component, rectangularity {:.2}", rectangularity);
            return Ok(None);
        }

        let sx = frame.width as f64 / w as f64;
        let sy = frame.height as f64 / h as f64;
        Ok(Some(quad.map(|p| Point::new(p.x * sx, p.y * sy))))
    }
}

/// Otsu's threshold over 8-bit samples; `None` for a single-valued image.
pub fn otsu_threshold(samples: &[u8]) -> Option<u8> {
    let mut histogram = [0u64; 256];
    for &s in samples {
        histogram[s as usize] += 1;
    }

    let total = samples.len() as f64;
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut background = 0.0;
    let mut background_sum = 0.0;
    let mut best_variance = 0.0;
    let mut best = None;

    for (level, &count) in histogram.iter().enumerate() {
        background += count as f64;
        if background == 0.0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0.0 {
            break;
        }
        background_sum += level as f64 * count as f64;

        let mean_b = background_sum / background;
        let mean_f = (weighted_total - background_sum) / foreground;
        let variance = background * foreground * (mean_b - mean_f).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best = Some(level as u8);
        }
    }
    best
}

/// Extreme points of one connected component
#[derive(Debug, Clone, Copy)]
struct Component {
    area: usize,
    top_left: (u32, u32),
    top_right: (u32, u32),
    bottom_right: (u32, u32),
    bottom_left: (u32, u32),
}

impl Component {
    fn seeded(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            top_left: (x, y),
            top_right: (x, y),
            bottom_right: (x, y),
            bottom_left: (x, y),
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        let sum = x as i64 + y as i64;
        let diff = x as i64 - y as i64;
        let key = |p: (u32, u32)| (p.0 as i64 + p.1 as i64, p.0 as i64 - p.1 as i64);

        if sum < key(self.top_left).0 {
            self.top_left = (x, y);
        }
        if sum > key(self.bottom_right).0 {
            self.bottom_right = (x, y);
        }
        if diff > key(self.top_right).1 {
            self.top_right = (x, y);
        }
        if diff < key(self.bottom_left).1 {
            self.bottom_left = (x, y);
        }
    }

    /// Corners on pixel edges, so a filled axis-aligned block maps onto
    /// exactly its own area.
    fn quad(&self) -> Quad {
        let p = |(x, y): (u32, u32), dx: u32, dy: u32| Point::new((x + dx) as f64, (y + dy) as f64);
        Quad::new(
            p(self.top_left, 0, 0),
            p(self.top_right, 1, 0),
            p(self.bottom_right, 1, 1),
            p(self.bottom_left, 0, 1),
        )
    }
}

fn largest_bright_component(gray: &GrayImage, threshold: u8) -> Option<Component> {
    let (w, h) = gray.dimensions();
    let raw = gray.as_raw();
    let idx = |x: u32, y: u32| y as usize * w as usize + x as usize;

    let mut visited = vec![false; raw.len()];
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut best: Option<Component> = None;

    for y in 0..h {
        for x in 0..w {
            let i = idx(x, y);
            if visited[i] || raw[i] <= threshold {
                continue;
            }

            let mut component = Component::seeded(x, y);
            visited[i] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                component.add(cx, cy);
                let neighbours = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx >= w || ny >= h {
                        continue;
                    }
                    let ni = idx(nx, ny);
                    if !visited[ni] && raw[ni] > threshold {
                        visited[ni] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            if best.map_or(true, |b| component.area > b.area) {
                best = Some(component);
            }
        }
    }
    best
}
