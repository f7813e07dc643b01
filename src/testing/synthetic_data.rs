//! Synthetic camera input

use crate::errors::ScanError;
use crate::geometry::Rect;
use crate::platform::FrameSource;
use crate::types::CameraFrame;
use std::time::Duration;

/// Grey level of the table under the sheet
pub const BACKGROUND_LUMA: u8 = 30;
/// Grey level of the sheet itself
pub const DOCUMENT_LUMA: u8 = 225;

/// A dark RGB8 frame with an optional bright axis-aligned sheet.
///
/// Pixel `(x, y)` belongs to the sheet when `x` lies in `[doc.x, doc.max_x())`
/// and `y` in `[doc.y, doc.max_y())`.
pub fn synthetic_document_frame(width: u32, height: u32, document: Option<Rect>) -> CameraFrame {
    let mut data = vec![BACKGROUND_LUMA; (width as usize) * (height as usize) * 3];

    if let Some(doc) = document {
        for y in 0..height {
            let fy = y as f64;
            if fy < doc.y || fy >= doc.max_y() {
                continue;
            }
            for x in 0..width {
                let fx = x as f64;
                if fx < doc.x || fx >= doc.max_x() {
                    continue;
                }
                let idx = (y as usize * width as usize + x as usize) * 3;
                data[idx..idx + 3].fill(DOCUMENT_LUMA);
            }
        }
    }

    CameraFrame::new(data, width, height, "synthetic".to_string())
}

/// Plays back a fixed list of frames.
///
/// Once the list is exhausted the source either ends (`Ok(None)`), starts
/// over (`repeating`), or fails with a stream error (`then_fail`).
pub struct ScriptedFrameSource {
    device_id: String,
    frames: Vec<CameraFrame>,
    position: usize,
    repeat: bool,
    interval: Option<Duration>,
    failure: Option<String>,
    started: bool,
}

impl ScriptedFrameSource {
    pub fn new(frames: Vec<CameraFrame>) -> Self {
        Self {
            device_id: "scripted".to_string(),
            frames,
            position: 0,
            repeat: false,
            interval: None,
            failure: None,
            started: false,
        }
    }

    /// The same frame forever
    pub fn repeating(frame: CameraFrame) -> Self {
        Self {
            repeat: true,
            ..Self::new(vec![frame])
        }
    }

    /// Sleep before handing out each frame, like a real sensor would.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }
}

impl FrameSource for ScriptedFrameSource {
    fn start(&mut self) -> Result<(), ScanError> {
        self.started = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<CameraFrame>, ScanError> {
        if !self.started {
            return Err(ScanError::InvalidState("stream not started".to_string()));
        }
        if let Some(interval) = self.interval {
            std::thread::sleep(interval);
        }

        if self.repeat && !self.frames.is_empty() {
            self.position %= self.frames.len();
        }

        match self.frames.get(self.position) {
            Some(frame) => {
                self.position += 1;
                let mut frame = frame.clone();
                frame.device_id = self.device_id.clone();
                Ok(Some(frame))
            }
            None => match &self.failure {
                Some(message) => Err(ScanError::StreamError(message.clone())),
                None => Ok(None),
            },
        }
    }

    fn stop(&mut self) -> Result<(), ScanError> {
        self.started = false;
        Ok(())
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}
