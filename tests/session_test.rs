//! Scan session lifecycle and worker behaviour, driven by scripted sources.

use crabscan::testing::{synthetic_document_frame, ScriptedFrameSource};
use crabscan::{
    CaptureReason, Decision, Rect, ScanError, ScanEvent, ScanSession, ScannerConfig,
    SessionState, ViewSize,
};
use std::path::Path;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);
const JOIN: Duration = Duration::from_secs(2);

fn test_config(output: &Path) -> ScannerConfig {
    let mut config = ScannerConfig::default();
    config.detection.frequency = 1;
    config.auto_capture.threshold = 3;
    config.storage.output_directory = output.to_string_lossy().into_owned();
    config.storage.organize_by_date = false;
    config
}

fn document_source() -> ScriptedFrameSource {
    let frame = synthetic_document_frame(160, 120, Some(Rect::new(30.0, 20.0, 90.0, 70.0)));
    ScriptedFrameSource::repeating(frame).with_interval(Duration::from_millis(2))
}

/// Pull events until one matches or the deadline passes.
fn wait_for<F>(session: &ScanSession, mut matches: F) -> Option<ScanEvent>
where
    F: FnMut(&ScanEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(event) = session.next_event(Duration::from_millis(50)).ok().flatten() {
            if matches(&event) {
                return Some(event);
            }
        }
    }
    None
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_stable_document_is_auto_captured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.auto_capture.enabled = true;

        let session = ScanSession::open(config).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        assert_eq!(session.state(), SessionState::Started);

        let event = wait_for(&session, |e| matches!(e, ScanEvent::PhotoCaptured(_)))
            .expect("a photo should be captured");
        match event {
            ScanEvent::PhotoCaptured(photo) => {
                assert_eq!(photo.reason, CaptureReason::Auto);
                assert!(photo.quad.is_some());
                let path = photo.saved_path.expect("photo should be saved");
                assert!(path.starts_with(dir.path()));
                assert!(path.exists());
            }
            other => panic!("unexpected event {:?}", other),
        }

        session.stop(JOIN).unwrap();
        let stats = session.stats();
        assert!(stats.captures >= 1);
        assert!(stats.detections >= 5);
        assert_eq!(stats.frames_seen, stats.frames_sampled);
    }

    #[test]
    fn test_disabled_auto_capture_only_reports_quads() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::open(test_config(dir.path())).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();

        let mut seen = 0;
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            match session.next_event(Duration::from_millis(20)).unwrap() {
                Some(ScanEvent::QuadDetected { decision, counter, .. }) => {
                    assert_eq!(decision, Decision::NoAction);
                    assert_eq!(counter, 0);
                    seen += 1;
                }
                Some(ScanEvent::PhotoCaptured(_)) => panic!("auto-capture is off"),
                _ => {}
            }
        }
        assert!(seen > 0);
        assert!(session.status().overlay.is_none());
        assert!(session.status().tolerance_region.is_none());
    }

    #[test]
    fn test_enabling_auto_capture_mid_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::open(test_config(dir.path())).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        assert!(wait_for(&session, |e| matches!(e, ScanEvent::QuadDetected { .. })).is_some());

        session.set_auto_capture(true).unwrap();
        assert!(session.is_auto_capture_enabled());
        assert!(wait_for(&session, |e| matches!(e, ScanEvent::PhotoCaptured(_))).is_some());

        session.set_auto_capture(false).unwrap();
        assert!(wait_until(|| {
            let status = session.status();
            status.tolerance_region.is_none() && status.overlay.is_none()
        }));
    }

    #[test]
    fn test_manual_capture() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.storage.save_captures = false;

        let session = ScanSession::open(config).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        session.request_capture().unwrap();

        match wait_for(&session, |e| matches!(e, ScanEvent::PhotoCaptured(_))) {
            Some(ScanEvent::PhotoCaptured(photo)) => {
                assert_eq!(photo.reason, CaptureReason::Manual);
                assert!(photo.saved_path.is_none());
                assert!(!photo.data.is_empty());
            }
            other => panic!("expected a manual photo, got {:?}", other),
        }
    }

    #[test]
    fn test_source_failure_is_reported() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        session
            .start_with(|| Ok(ScriptedFrameSource::new(vec![]).then_fail("unplugged")))
            .unwrap();

        match wait_for(&session, |e| matches!(e, ScanEvent::SourceFailed { .. })) {
            Some(ScanEvent::SourceFailed { message, terminal }) => {
                assert!(message.contains("unplugged"));
                assert!(!terminal);
            }
            other => panic!("expected a source failure, got {:?}", other),
        }
    }

    #[test]
    fn test_source_end_is_reported() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        let frames = vec![synthetic_document_frame(8, 8, None); 3];
        session
            .start_with(move || Ok(ScriptedFrameSource::new(frames)))
            .unwrap();

        assert!(wait_for(&session, |e| matches!(e, ScanEvent::SourceEnded)).is_some());
        assert_eq!(session.stats().frames_seen, 3);
    }

    #[test]
    fn test_open_failure_leaves_session_open() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        let err = session
            .start_with(|| -> Result<ScriptedFrameSource, ScanError> {
                Err(ScanError::DeviceNotFound("camera 7".to_string()))
            })
            .unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(session.state(), SessionState::Open);

        session.start_with(|| Ok(document_source())).unwrap();
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        assert!(matches!(
            session.start_with(|| Ok(document_source())),
            Err(ScanError::InvalidState(_))
        ));

        session.stop(JOIN).unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stop(JOIN).is_err());
        assert!(session.request_capture().is_err());

        // restart after stop
        session.start_with(|| Ok(document_source())).unwrap();
        session.close(JOIN).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.close(JOIN).is_err());
        assert!(session.next_event(Duration::ZERO).is_err());
        assert!(session.set_auto_capture(true).is_err());
    }

    #[test]
    fn test_full_queue_drops_oldest_events() {
        let mut config = ScannerConfig::default();
        config.detection.frequency = 1;
        config.session.event_queue_capacity = 2;

        let session = ScanSession::open(config).unwrap();
        let frame = synthetic_document_frame(64, 48, Some(Rect::new(10.0, 10.0, 40.0, 30.0)));
        session
            .start_with(move || Ok(ScriptedFrameSource::new(vec![frame; 10])))
            .unwrap();

        assert!(wait_until(|| session.stats().frames_seen == 10));
        // 10 detections plus the end marker through a queue of two
        assert!(wait_until(|| session.stats().dropped_events == 9));
        let mut remaining = Vec::new();
        while let Some(event) = session.next_event(Duration::ZERO).unwrap() {
            remaining.push(event);
        }
        assert_eq!(remaining.len(), 2);
        assert!(matches!(remaining[1], ScanEvent::SourceEnded));
    }

    #[test]
    fn test_enabling_auto_capture_right_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::open(test_config(dir.path())).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        session.set_auto_capture(true).unwrap();

        assert!(wait_for(&session, |e| matches!(e, ScanEvent::PhotoCaptured(_))).is_some());
        assert!(session.status().tolerance_region.is_some());
    }

    #[test]
    fn test_quick_off_on_restarts_stability_count() {
        let mut config = ScannerConfig::default();
        config.detection.frequency = 1;
        config.auto_capture.enabled = true;
        // High enough that no trigger resets the count during the test
        config.auto_capture.threshold = 100_000;

        let frame = synthetic_document_frame(160, 120, Some(Rect::new(30.0, 20.0, 90.0, 70.0)));
        let session = ScanSession::open(config).unwrap();
        session
            .start_with(move || {
                Ok(ScriptedFrameSource::repeating(frame).with_interval(Duration::from_millis(10)))
            })
            .unwrap();

        assert!(wait_until(|| session.status().stability_counter >= 10));
        let before = session.status().stability_counter;
        session.set_auto_capture(false).unwrap();
        session.set_auto_capture(true).unwrap();

        // A steady document only ever climbs, so a lower count means a fresh seed
        assert!(wait_until(|| session.status().stability_counter < before));
        assert!(session.status().tolerance_region.is_some());
        assert!(session.is_auto_capture_enabled());
    }

    #[test]
    fn test_manual_capture_quad_is_in_image_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.storage.save_captures = false;

        let session = ScanSession::open(config).unwrap();
        session.start_with(|| Ok(document_source())).unwrap();
        session.set_view_size(ViewSize::new(80.0, 60.0)).unwrap();
        assert!(wait_for(&session, |e| matches!(e, ScanEvent::QuadDetected { .. })).is_some());

        session.request_capture().unwrap();
        match wait_for(&session, |e| matches!(e, ScanEvent::PhotoCaptured(_))) {
            Some(ScanEvent::PhotoCaptured(photo)) => {
                assert_eq!(photo.reason, CaptureReason::Manual);
                let quad = photo.quad.expect("document was in view");
                assert_eq!(quad.bounding_box(), Rect::new(30.0, 20.0, 90.0, 70.0));
            }
            other => panic!("expected a manual photo, got {:?}", other),
        }
    }

    #[test]
    fn test_restart_after_source_failure() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        session
            .start_with(|| Ok(ScriptedFrameSource::new(vec![]).then_fail("unplugged")))
            .unwrap();
        assert!(wait_for(&session, |e| matches!(e, ScanEvent::SourceFailed { .. })).is_some());

        assert!(wait_until(|| session.state() == SessionState::Stopped));
        assert!(session.request_capture().is_err());

        session.start_with(|| Ok(document_source())).unwrap();
        assert_eq!(session.state(), SessionState::Started);
        session.close(JOIN).unwrap();
    }

    #[test]
    fn test_source_end_stops_session() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        let frames = vec![synthetic_document_frame(8, 8, None); 2];
        session
            .start_with(move || Ok(ScriptedFrameSource::new(frames)))
            .unwrap();

        assert!(wait_until(|| session.state() == SessionState::Stopped));
        // Events queued before the worker exited can still be drained
        assert!(wait_for(&session, |e| matches!(e, ScanEvent::SourceEnded)).is_some());
    }
}
