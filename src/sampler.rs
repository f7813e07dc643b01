//! Frame throttling for detection
//!
//! Rectangle detection is far more expensive than preview, so only every Nth
//! frame is handed to the detector.

use serde::{Deserialize, Serialize};

pub const DEFAULT_FREQUENCY: u32 = 5;
pub const DEFAULT_WRAP: u32 = 100;

/// Picks every `frequency`-th frame; the running count wraps at `wrap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSampler {
    frequency: u32,
    wrap: u32,
    count: u32,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY, DEFAULT_WRAP)
    }
}

impl FrameSampler {
    /// `frequency` and `wrap` of zero are treated as one. The wrap is rounded
    /// up to a multiple of the frequency so the cadence survives wrapping.
    pub fn new(frequency: u32, wrap: u32) -> Self {
        let frequency = frequency.max(1);
        let wrap = wrap.max(frequency).div_ceil(frequency) * frequency;
        Self {
            frequency,
            wrap,
            count: 0,
        }
    }

    /// Count one frame; true when it should go to the detector.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        let selected = self.count % self.frequency == 0;
        if self.count >= self.wrap {
            self.count = 0;
        }
        selected
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn wrap(&self) -> u32 {
        self.wrap
    }
}
