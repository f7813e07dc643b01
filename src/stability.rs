//! Auto-capture stability tracking
//!
//! Each detected document bounding box is tested against a tolerance region
//! (the first accepted box grown by a fixed margin). Consecutive boxes that
//! stay inside the region count towards a threshold; the first event after
//! the threshold is reached fires a capture and restarts the count. A box
//! that escapes the region seeds a fresh region and restarts the count.
//!
//! The state is a plain value and [`StabilityState::evaluate`] is a pure
//! transition, so the whole machine can be exercised without a camera.

use crate::assert_invariant;
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Margin added on every side of an accepted detection
pub const DEFAULT_MARGIN: f64 = 50.0;

/// Contained detections required before a capture fires
pub const DEFAULT_THRESHOLD: u32 = 25;

const COUNTER_INVARIANT: &str = "Stability counter stays within threshold";
const RESET_INVARIANT: &str = "Region reset zeroes the stability counter";

/// Tuning for a tracker. Fixed for the tracker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityPolicy {
    pub margin: f64,
    pub threshold: u32,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl StabilityPolicy {
    pub fn new(margin: f64, threshold: u32) -> Self {
        Self { margin, threshold }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err("Stability margin must be a finite, non-negative number".to_string());
        }
        if self.threshold == 0 {
            return Err("Stability threshold must be at least 1".to_string());
        }
        Ok(())
    }

    /// Tolerance region for an accepted detection
    pub fn region_for(&self, detection: &Rect) -> Rect {
        detection.expanded(self.margin)
    }
}

/// Outcome of evaluating one detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    NoAction,
    Trigger,
}

impl Decision {
    pub fn is_trigger(&self) -> bool {
        matches!(self, Decision::Trigger)
    }
}

/// Coarse view of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerPhase {
    NoRegion,
    Tracking,
}

/// Tolerance region plus the count of detections contained in it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StabilityState {
    pub region: Option<Rect>,
    pub counter: u32,
}

impl StabilityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TrackerPhase {
        match self.region {
            Some(_) => TrackerPhase::Tracking,
            None => TrackerPhase::NoRegion,
        }
    }

    /// Advance the state machine by one detection.
    pub fn evaluate(self, detection: &Rect, policy: &StabilityPolicy) -> (StabilityState, Decision) {
        let (next, decision) = match self.region {
            None => (Self::seeded(detection, policy), Decision::NoAction),
            Some(region) if self.counter >= policy.threshold => (
                StabilityState {
                    region: Some(region),
                    counter: 0,
                },
                Decision::Trigger,
            ),
            Some(region) if region.contains_rect(detection) => (
                StabilityState {
                    region: Some(region),
                    counter: self.counter + 1,
                },
                Decision::NoAction,
            ),
            Some(_) => (Self::seeded(detection, policy), Decision::NoAction),
        };

        assert_invariant!(
            next.counter <= policy.threshold,
            COUNTER_INVARIANT,
            "stability::evaluate"
        );
        (next, decision)
    }

    fn seeded(detection: &Rect, policy: &StabilityPolicy) -> StabilityState {
        let next = StabilityState {
            region: Some(policy.region_for(detection)),
            counter: 0,
        };
        assert_invariant!(next.counter == 0, RESET_INVARIANT, "stability::seed");
        next
    }
}

/// Pure transition: `(state, detection) -> (state', decision)`.
pub fn evaluate(
    state: StabilityState,
    detection: &Rect,
    policy: &StabilityPolicy,
) -> (StabilityState, Decision) {
    state.evaluate(detection, policy)
}

/// Owns a policy and the current state; drive it from a single thread.
#[derive(Debug, Clone, Default)]
pub struct StabilityTracker {
    policy: StabilityPolicy,
    state: StabilityState,
}

impl StabilityTracker {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self {
            policy,
            state: StabilityState::new(),
        }
    }

    pub fn evaluate(&mut self, detection: &Rect) -> Decision {
        let before = self.state;
        let (next, decision) = self.state.evaluate(detection, &self.policy);
        self.state = next;

        match decision {
            Decision::Trigger => {
                log::info!(
                    "Detection stable for {} frames, triggering capture",
                    self.policy.threshold
                );
            }
            Decision::NoAction if before.region != next.region => {
                log::debug!("Tolerance region reset to {:?}", next.region);
            }
            Decision::NoAction => {
                log::trace!("Detection contained, counter {}", next.counter);
            }
        }
        decision
    }

    /// Drop the region and zero the counter.
    pub fn reset(&mut self) {
        if self.state.region.is_some() {
            log::debug!("Stability tracker reset");
        }
        self.state = StabilityState::new();
    }

    pub fn region(&self) -> Option<Rect> {
        self.state.region
    }

    pub fn counter(&self) -> u32 {
        self.state.counter
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.phase()
    }

    pub fn state(&self) -> StabilityState {
        self.state
    }

    pub fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }
}
