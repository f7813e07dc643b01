//! Overlay state for the detected document outline.
//!
//! Drawing belongs to the host UI; this only tracks what should be drawn.

use crate::geometry::{Quad, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// RGBA stroke for the quad outline
    pub stroke_color: [u8; 4],
    pub line_width: f32,
    pub opacity: f32,
    /// RGBA border around the overlay layer
    pub border_color: [u8; 4],
    pub border_width: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_color: [255, 255, 255, 255],
            line_width: 2.0,
            opacity: 0.5,
            border_color: [0, 0, 255, 255],
            border_width: 2.0,
        }
    }
}

/// The quad currently shown over the preview, in view coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadOverlay {
    quad: Option<Quad>,
    style: OverlayStyle,
}

impl QuadOverlay {
    pub fn new(style: OverlayStyle) -> Self {
        Self { quad: None, style }
    }

    pub fn show(&mut self, quad: Quad) {
        self.quad = Some(quad);
    }

    pub fn clear(&mut self) {
        self.quad = None;
    }

    pub fn quad(&self) -> Option<&Quad> {
        self.quad.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.quad.is_some()
    }

    /// Bounding box of the shown outline
    pub fn bounding_box(&self) -> Option<Rect> {
        self.quad.as_ref().map(Quad::bounding_box)
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }
}
