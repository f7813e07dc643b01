//! Per-frame document scanning pipeline
//!
//! sampler -> detector -> view transform -> overlay -> stability tracker.
//! Everything here runs synchronously on the caller's thread; the session
//! worker owns one [`DocumentScanner`] and feeds it every camera frame.

use crate::capture::{CaptureReason, CaptureTrigger};
use crate::config::ScannerConfig;
use crate::detection::QuadDetector;
use crate::errors::ScanError;
use crate::geometry::{Quad, Rect, ViewSize, ViewTransform};
use crate::overlay::{OverlayStyle, QuadOverlay};
use crate::sampler::FrameSampler;
use crate::stability::{Decision, StabilityPolicy, StabilityTracker};
use crate::types::CameraFrame;
use serde::{Deserialize, Serialize};

/// What happened to one camera frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameOutcome {
    /// Not selected for detection
    Skipped,
    /// Detection ran and found nothing
    NoQuad,
    Detected {
        /// Outline in image pixels
        image_quad: Quad,
        /// Outline in view coordinates
        view_quad: Quad,
        /// Bounding box of `view_quad`, the event fed to the tracker
        bounds: Rect,
        decision: Decision,
    },
}

impl FrameOutcome {
    pub fn decision(&self) -> Decision {
        match self {
            FrameOutcome::Detected { decision, .. } => *decision,
            _ => Decision::NoAction,
        }
    }
}

pub struct DocumentScanner<D: QuadDetector> {
    sampler: FrameSampler,
    detector: D,
    tracker: StabilityTracker,
    overlay: QuadOverlay,
    view: Option<ViewSize>,
    swap_axes: bool,
    auto_capture: bool,
}

impl<D: QuadDetector> DocumentScanner<D> {
    /// Default sampler and policy, auto-capture off.
    pub fn new(detector: D) -> Self {
        Self {
            sampler: FrameSampler::default(),
            detector,
            tracker: StabilityTracker::default(),
            overlay: QuadOverlay::default(),
            view: None,
            swap_axes: false,
            auto_capture: false,
        }
    }

    pub fn from_config(config: &ScannerConfig, detector: D) -> Self {
        Self {
            sampler: config.sampler(),
            detector,
            tracker: StabilityTracker::new(config.stability_policy()),
            overlay: QuadOverlay::new(config.overlay.clone()),
            view: None,
            swap_axes: config.camera.rotate_to_portrait,
            auto_capture: config.auto_capture.enabled,
        }
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_policy(mut self, policy: StabilityPolicy) -> Self {
        self.tracker = StabilityTracker::new(policy);
        self
    }

    pub fn with_overlay_style(mut self, style: OverlayStyle) -> Self {
        self.overlay = QuadOverlay::new(style);
        self
    }

    pub fn with_view(mut self, view: ViewSize, swap_axes: bool) -> Self {
        self.view = Some(view);
        self.swap_axes = swap_axes;
        self
    }

    pub fn with_auto_capture(mut self, enabled: bool) -> Self {
        self.auto_capture = enabled;
        self
    }

    /// Layout changed; later frames are projected into the new view.
    pub fn set_view_size(&mut self, view: ViewSize) {
        self.view = Some(view);
    }

    /// Any change of the flag drops the tolerance region and the overlay.
    pub fn set_auto_capture_enabled(&mut self, enabled: bool) {
        if self.auto_capture == enabled {
            return;
        }
        self.auto_capture = enabled;
        self.reset_tracking();
        log::info!(
            "Auto-capture {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn reset_tracking(&mut self) {
        self.tracker.reset();
        self.overlay.clear();
    }

    pub fn is_auto_capture_enabled(&self) -> bool {
        self.auto_capture
    }

    pub fn overlay(&self) -> &QuadOverlay {
        &self.overlay
    }

    pub fn tracker(&self) -> &StabilityTracker {
        &self.tracker
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    fn transform_for(&self, frame: &CameraFrame) -> ViewTransform {
        match self.view {
            Some(view) => ViewTransform::aspect_fit(frame.width, frame.height, view, self.swap_axes),
            None => ViewTransform {
                swap_axes: self.swap_axes,
                ..ViewTransform::identity()
            },
        }
    }

    pub fn process_frame(&mut self, frame: &CameraFrame) -> Result<FrameOutcome, ScanError> {
        if !self.sampler.tick() {
            return Ok(FrameOutcome::Skipped);
        }

        let image_quad = match self.detector.detect(frame)? {
            Some(quad) => quad,
            None => {
                self.overlay.clear();
                return Ok(FrameOutcome::NoQuad);
            }
        };

        let view_quad = self.transform_for(frame).apply_quad(&image_quad);
        let bounds = view_quad.bounding_box();

        let decision = if self.auto_capture {
            self.overlay.show(view_quad);
            self.tracker.evaluate(&bounds)
        } else {
            self.overlay.clear();
            Decision::NoAction
        };

        Ok(FrameOutcome::Detected {
            image_quad,
            view_quad,
            bounds,
            decision,
        })
    }
}

/// Request exactly one capture for a `Trigger` outcome. Returns whether a
/// capture was requested.
pub fn dispatch<T: CaptureTrigger + ?Sized>(outcome: &FrameOutcome, trigger: &mut T) -> bool {
    if outcome.decision().is_trigger() {
        trigger.request_capture(CaptureReason::Auto);
        true
    } else {
        false
    }
}
