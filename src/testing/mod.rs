//! Testing utilities for crabscan
//!
//! Synthetic document frames and scripted frame sources, so the scanner and
//! the session can be exercised without a camera.

pub mod synthetic_data;

pub use synthetic_data::{synthetic_document_frame, ScriptedFrameSource, BACKGROUND_LUMA, DOCUMENT_LUMA};
