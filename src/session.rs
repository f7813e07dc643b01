//! Scan session: one worker thread driving a [`DocumentScanner`]
//!
//! The worker owns the frame source and the scanner, so every tracker
//! evaluation happens serially on one thread. Other threads talk to it only
//! through atomics and a bounded drop-oldest event queue.

use crate::capture::{CaptureReason, CapturedPhoto};
use crate::config::ScannerConfig;
use crate::detection::QuadDetector;
use crate::errors::ScanError;
use crate::geometry::{Quad, Rect, ViewSize};
use crate::platform::{list_cameras, select_camera, FrameSource, NokhwaCamera};
use crate::scanner::{dispatch, DocumentScanner, FrameOutcome};
use crate::stability::Decision;
use crate::types::CameraFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Started,
    Stopped,
    Closed,
}

/// Something the worker wants the host to know about
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A document was found; `quad` and `bounds` are in view coordinates.
    QuadDetected {
        frame_id: String,
        quad: Quad,
        bounds: Rect,
        counter: u32,
        decision: Decision,
    },
    /// The document was seen on the previous sampled frame but not this one.
    QuadLost { frame_id: String },
    PhotoCaptured(CapturedPhoto),
    CaptureFailed {
        reason: CaptureReason,
        message: String,
    },
    /// The camera stopped delivering frames; the worker has exited.
    SourceFailed { message: String, terminal: bool },
    SourceEnded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub frames_seen: u64,
    pub frames_sampled: u64,
    pub detections: u64,
    pub captures: u64,
    pub dropped_events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: SessionState,
    pub device_id: Option<String>,
    pub auto_capture: bool,
    /// Outline currently drawn over the preview
    pub overlay: Option<Quad>,
    pub tolerance_region: Option<Rect>,
    pub stability_counter: u32,
    pub stats: ScanStats,
}

struct Queue<T> {
    inner: Mutex<QueueInner<T>>,
    cv: Condvar,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl<T> Queue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                dropped: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn push_drop_oldest(&self, item: T) {
        let mut g = self.inner.lock().expect("lock poisoned");
        if g.closed {
            return;
        }

        if g.items.len() >= g.capacity {
            g.items.pop_front();
            g.dropped = g.dropped.saturating_add(1);
        }
        g.items.push_back(item);
        self.cv.notify_one();
    }

    fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, ScanError> {
        let mut g = self.inner.lock().expect("lock poisoned");

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = g.items.pop_front() {
                return Ok(Some(item));
            }
            if g.closed {
                return Err(ScanError::InvalidState("session closed".to_string()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .expect("lock poisoned");
            g = ng;
        }
    }

    fn dropped(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").dropped
    }

    fn close(&self) {
        let mut g = self.inner.lock().expect("lock poisoned");
        g.closed = true;
        self.cv.notify_all();
    }
}

#[derive(Default)]
struct Counters {
    frames_seen: AtomicU64,
    frames_sampled: AtomicU64,
    detections: AtomicU64,
    captures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What the worker last published about its scanner
#[derive(Debug, Clone, Default)]
struct Snapshot {
    overlay: Option<Quad>,
    region: Option<Rect>,
    counter: u32,
}

struct Inner {
    config: ScannerConfig,
    state: Mutex<SessionState>,
    events: Queue<ScanEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
    device_id: Mutex<Option<String>>,
    stop_flag: AtomicBool,
    auto_capture: AtomicBool,
    /// Bumped on every auto-capture change so the worker resets even when
    /// the flag flips back before it looks.
    auto_generation: AtomicU64,
    capture_requested: AtomicBool,
    view: Mutex<Option<ViewSize>>,
    counters: Counters,
    snapshot: Mutex<Snapshot>,
}

/// Owns the worker thread. Dropping the session closes it.
pub struct ScanSession {
    inner: Arc<Inner>,
}

impl ScanSession {
    pub fn open(config: ScannerConfig) -> Result<Self, ScanError> {
        config.validate().map_err(ScanError::ConfigError)?;

        let capacity = config.session.event_queue_capacity;
        let auto_capture = config.auto_capture.enabled;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(SessionState::Open),
                events: Queue::new(capacity),
                worker: Mutex::new(None),
                device_id: Mutex::new(None),
                stop_flag: AtomicBool::new(false),
                auto_capture: AtomicBool::new(auto_capture),
                auto_generation: AtomicU64::new(0),
                capture_requested: AtomicBool::new(false),
                view: Mutex::new(None),
                counters: Counters::default(),
                snapshot: Mutex::new(Snapshot::default()),
            }),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// Scan with the camera chosen by the `[camera]` config section.
    pub fn start(&self) -> Result<(), ScanError> {
        crate::permissions::ensure_camera_access()?;

        let camera = &self.inner.config.camera;
        let devices = list_cameras()?;
        let device = select_camera(&devices, camera.device_id.as_deref(), camera.preferred_position)?;
        let format = self.inner.config.camera_format();
        log::info!("Scanning with {} ({})", device.name, device.id);

        self.start_with(move || NokhwaCamera::open(&device.id, &format))
    }

    /// Scan frames from a custom source, with the configured detector.
    pub fn start_with<F, S>(&self, factory: F) -> Result<(), ScanError>
    where
        F: FnOnce() -> Result<S, ScanError> + Send + 'static,
        S: FrameSource + 'static,
    {
        let detector = self.inner.config.detector();
        self.start_with_parts(factory, detector)
    }

    /// The source is created and started on the worker thread, so it need
    /// not be `Send`. Open failures are reported back here.
    pub fn start_with_parts<F, S, D>(&self, factory: F, detector: D) -> Result<(), ScanError>
    where
        F: FnOnce() -> Result<S, ScanError> + Send + 'static,
        S: FrameSource + 'static,
        D: QuadDetector + 'static,
    {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        match *state {
            SessionState::Closed => {
                return Err(ScanError::InvalidState("session closed".to_string()))
            }
            SessionState::Started => {
                return Err(ScanError::InvalidState("session already started".to_string()))
            }
            SessionState::Open | SessionState::Stopped => {}
        }

        let leftover = self.inner.worker.lock().expect("lock poisoned").take();
        if let Some(handle) = leftover {
            let join_timeout = Duration::from_millis(self.inner.config.session.join_timeout_ms);
            join_with_timeout(&self.inner, handle, join_timeout).map_err(|_| {
                ScanError::InvalidState("previous scan worker is still shutting down".to_string())
            })?;
        }

        self.inner.stop_flag.store(false, Ordering::Release);
        // Generation first: a toggle racing this start bumps it past what the
        // worker holds, so the worker re-reads the flag on its first frame.
        let generation = self.inner.auto_generation.load(Ordering::Acquire);
        let scanner = DocumentScanner::from_config(&self.inner.config, detector)
            .with_auto_capture(self.inner.auto_capture.load(Ordering::Acquire));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, ScanError>>();
        let inner = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("crabscan-scan-worker".to_string())
            .spawn(move || {
                let opened = factory().and_then(|mut source| {
                    source.start()?;
                    Ok(source)
                });
                match opened {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(source.device_id().to_string()));
                        scan_loop(&inner, source, scanner, generation);
                        worker_exited(&inner);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| ScanError::InitializationError(format!("spawn failed: {}", e)))?;

        let open_timeout = Duration::from_millis(self.inner.config.session.open_timeout_ms);
        match ready_rx.recv_timeout(open_timeout) {
            Ok(Ok(device_id)) => {
                log::info!("Scan session started on {}", device_id);
                *self.inner.device_id.lock().expect("lock poisoned") = Some(device_id);
                *self.inner.worker.lock().expect("lock poisoned") = Some(handle);
                *state = SessionState::Started;
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                log::error!("Failed to open frame source: {}", e);
                Err(e)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Leave the handle behind so a later stop or close can reap it.
                self.inner.stop_flag.store(true, Ordering::Release);
                *self.inner.worker.lock().expect("lock poisoned") = Some(handle);
                Err(ScanError::InitializationError(format!(
                    "camera did not open within {:?}",
                    open_timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(ScanError::InitializationError(
                    "scan worker exited before the camera opened".to_string(),
                ))
            }
        }
    }

    /// Takes effect before the worker evaluates its next frame. Any change
    /// clears the tolerance region and the overlay.
    pub fn set_auto_capture(&self, enabled: bool) -> Result<(), ScanError> {
        self.ensure_not_closed()?;
        let previous = self.inner.auto_capture.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            self.inner.auto_generation.fetch_add(1, Ordering::AcqRel);
            log::debug!("Auto-capture change requested: {}", enabled);
        }
        Ok(())
    }

    pub fn is_auto_capture_enabled(&self) -> bool {
        self.inner.auto_capture.load(Ordering::Acquire)
    }

    /// Capture the next frame regardless of stability.
    pub fn request_capture(&self) -> Result<(), ScanError> {
        let state = *self.inner.state.lock().expect("lock poisoned");
        if state != SessionState::Started {
            return Err(ScanError::InvalidState(format!(
                "cannot capture while {:?}",
                state
            )));
        }
        self.inner.capture_requested.store(true, Ordering::Release);
        Ok(())
    }

    pub fn set_view_size(&self, view: ViewSize) -> Result<(), ScanError> {
        self.ensure_not_closed()?;
        *self.inner.view.lock().expect("lock poisoned") = Some(view);
        Ok(())
    }

    pub fn next_event(&self, timeout: Duration) -> Result<Option<ScanEvent>, ScanError> {
        let state = *self.inner.state.lock().expect("lock poisoned");
        match state {
            SessionState::Closed => {
                return Err(ScanError::InvalidState("session closed".to_string()))
            }
            SessionState::Open => {
                return Err(ScanError::InvalidState("session not started".to_string()))
            }
            SessionState::Started | SessionState::Stopped => {}
        }
        self.inner.events.pop_timeout(timeout)
    }

    pub fn stats(&self) -> ScanStats {
        let c = &self.inner.counters;
        ScanStats {
            frames_seen: c.frames_seen.load(Ordering::Relaxed),
            frames_sampled: c.frames_sampled.load(Ordering::Relaxed),
            detections: c.detections.load(Ordering::Relaxed),
            captures: c.captures.load(Ordering::Relaxed),
            dropped_events: self.inner.events.dropped(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("lock poisoned")
    }

    pub fn status(&self) -> ScanStatus {
        let snapshot = self.inner.snapshot.lock().expect("lock poisoned").clone();
        ScanStatus {
            state: self.state(),
            device_id: self.inner.device_id.lock().expect("lock poisoned").clone(),
            auto_capture: self.is_auto_capture_enabled(),
            overlay: snapshot.overlay,
            tolerance_region: snapshot.region,
            stability_counter: snapshot.counter,
            stats: self.stats(),
        }
    }

    pub fn stop(&self, join_timeout: Duration) -> Result<(), ScanError> {
        let state = self.inner.state.lock().expect("lock poisoned");
        match *state {
            SessionState::Closed => {
                return Err(ScanError::InvalidState("session closed".to_string()))
            }
            SessionState::Open | SessionState::Stopped => {
                return Err(ScanError::InvalidState("session not running".to_string()))
            }
            SessionState::Started => {}
        }

        self.inner.stop_flag.store(true, Ordering::Release);
        let join_handle = self.inner.worker.lock().expect("lock poisoned").take();
        drop(state);

        if let Some(handle) = join_handle {
            join_with_timeout(&self.inner, handle, join_timeout)?;
        }

        let mut state = self.inner.state.lock().expect("lock poisoned");
        if *state != SessionState::Closed {
            *state = SessionState::Stopped;
        }
        log::info!("Scan session stopped");
        Ok(())
    }

    pub fn close(&self, join_timeout: Duration) -> Result<(), ScanError> {
        {
            let state = *self.inner.state.lock().expect("lock poisoned");
            if state == SessionState::Closed {
                return Err(ScanError::InvalidState("session already closed".to_string()));
            }
        }

        if self.state() == SessionState::Started {
            if let Err(e) = self.stop(join_timeout) {
                log::warn!("Error stopping session during close: {}", e);
            }
        } else {
            // A worker left behind by an open timeout
            self.inner.stop_flag.store(true, Ordering::Release);
            let leftover = self.inner.worker.lock().expect("lock poisoned").take();
            if let Some(handle) = leftover {
                if let Err(e) = join_with_timeout(&self.inner, handle, join_timeout) {
                    log::warn!("Scan worker did not exit during close: {}", e);
                }
            }
        }

        self.inner.events.close();
        *self.inner.state.lock().expect("lock poisoned") = SessionState::Closed;
        Ok(())
    }

    fn ensure_not_closed(&self) -> Result<(), ScanError> {
        if self.state() == SessionState::Closed {
            return Err(ScanError::InvalidState("session closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.state() == SessionState::Closed {
            return;
        }
        let timeout = Duration::from_millis(self.inner.config.session.join_timeout_ms);
        if let Err(e) = self.close(timeout) {
            log::warn!("Error closing scan session in drop: {}", e);
        }
    }
}

/// Poll for the worker to finish. On timeout the handle goes back into the
/// session so a later stop or close can retry.
fn join_with_timeout(
    inner: &Inner,
    handle: JoinHandle<()>,
    join_timeout: Duration,
) -> Result<(), ScanError> {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("Scan worker panicked");
            }
            return Ok(());
        }
        if start.elapsed() >= join_timeout {
            *inner.worker.lock().expect("lock poisoned") = Some(handle);
            return Err(ScanError::InvalidState(format!(
                "scan worker did not stop within {:?}",
                join_timeout
            )));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A worker that ran out of frames leaves the session stopped, so it can be
/// restarted and stops accepting capture requests.
fn worker_exited(inner: &Inner) {
    let mut state = inner.state.lock().expect("lock poisoned");
    if *state == SessionState::Started {
        *state = SessionState::Stopped;
        log::info!("Scan worker exited, session stopped");
    }
}

fn scan_loop<S, D>(
    inner: &Inner,
    mut source: S,
    mut scanner: DocumentScanner<D>,
    mut generation: u64,
) where
    S: FrameSource,
    D: QuadDetector,
{
    let mut view: Option<ViewSize> = None;
    // Last document outline in source image coordinates
    let mut last_quad: Option<Quad> = None;

    loop {
        if inner.stop_flag.load(Ordering::Acquire) {
            break;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("Frame source {} ended", source.device_id());
                inner.events.push_drop_oldest(ScanEvent::SourceEnded);
                break;
            }
            Err(e) => {
                log::error!("Frame source {} failed: {}", source.device_id(), e);
                inner.events.push_drop_oldest(ScanEvent::SourceFailed {
                    message: e.to_string(),
                    terminal: e.is_terminal(),
                });
                break;
            }
        };
        Counters::bump(&inner.counters.frames_seen);

        let current = inner.auto_generation.load(Ordering::Acquire);
        if current != generation {
            generation = current;
            scanner.set_auto_capture_enabled(inner.auto_capture.load(Ordering::Acquire));
            scanner.reset_tracking();
        }

        let requested_view = *inner.view.lock().expect("lock poisoned");
        if requested_view != view {
            view = requested_view;
            if let Some(v) = view {
                scanner.set_view_size(v);
            }
        }

        if inner.capture_requested.swap(false, Ordering::AcqRel) {
            capture_photo(inner, &frame, CaptureReason::Manual, last_quad);
        }

        match scanner.process_frame(&frame) {
            Ok(FrameOutcome::Skipped) => {}
            Ok(FrameOutcome::NoQuad) => {
                Counters::bump(&inner.counters.frames_sampled);
                if last_quad.take().is_some() {
                    inner.events.push_drop_oldest(ScanEvent::QuadLost {
                        frame_id: frame.id.clone(),
                    });
                }
            }
            Ok(outcome @ FrameOutcome::Detected { .. }) => {
                Counters::bump(&inner.counters.frames_sampled);
                Counters::bump(&inner.counters.detections);

                if let FrameOutcome::Detected {
                    image_quad,
                    view_quad,
                    bounds,
                    decision,
                } = &outcome
                {
                    inner.events.push_drop_oldest(ScanEvent::QuadDetected {
                        frame_id: frame.id.clone(),
                        quad: *view_quad,
                        bounds: *bounds,
                        counter: scanner.tracker().counter(),
                        decision: *decision,
                    });

                    last_quad = Some(*image_quad);
                    dispatch(&outcome, &mut |reason: CaptureReason| {
                        capture_photo(inner, &frame, reason, last_quad)
                    });
                }
            }
            Err(e) => {
                Counters::bump(&inner.counters.frames_sampled);
                log::warn!("Detection failed on frame {}: {}", frame.id, e);
            }
        }

        *inner.snapshot.lock().expect("lock poisoned") = Snapshot {
            overlay: scanner.overlay().quad().copied(),
            region: scanner.tracker().region(),
            counter: scanner.tracker().counter(),
        };
    }

    if let Err(e) = source.stop() {
        log::warn!("Failed to stop frame source: {}", e);
    }
}

fn capture_photo(inner: &Inner, frame: &CameraFrame, reason: CaptureReason, quad: Option<Quad>) {
    let storage = &inner.config.storage;
    let result = CapturedPhoto::from_frame(frame, &inner.config.photo, reason, quad).and_then(
        |mut photo| {
            if storage.save_captures {
                photo.save_to_dir(&storage.output_directory, storage.organize_by_date)?;
            }
            Ok(photo)
        },
    );

    match result {
        Ok(photo) => {
            Counters::bump(&inner.counters.captures);
            log::info!("Captured {:?} photo {}", reason, photo.id);
            inner.events.push_drop_oldest(ScanEvent::PhotoCaptured(photo));
        }
        Err(e) => {
            log::warn!("{:?} capture failed: {}", reason, e);
            inner.events.push_drop_oldest(ScanEvent::CaptureFailed {
                reason,
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_drops_oldest() {
        let queue = Queue::new(2);
        queue.push_drop_oldest(1);
        queue.push_drop_oldest(2);
        queue.push_drop_oldest(3);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap(), Some(2));
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap(), Some(3));
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_closed_queue_drains_then_errors() {
        let queue = Queue::new(4);
        queue.push_drop_oldest("a");
        queue.close();
        queue.push_drop_oldest("b");
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap(), Some("a"));
        assert!(queue.pop_timeout(Duration::ZERO).is_err());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = ScannerConfig::default();
        config.auto_capture.threshold = 0;
        assert!(matches!(
            ScanSession::open(config),
            Err(ScanError::ConfigError(_))
        ));
    }

    #[test]
    fn test_events_before_start() {
        let session = ScanSession::open(ScannerConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert!(session.next_event(Duration::ZERO).is_err());
        assert!(session.request_capture().is_err());
        assert!(session.stop(Duration::from_millis(10)).is_err());
    }
}
