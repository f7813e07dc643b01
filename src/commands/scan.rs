use crate::commands::config::current_config;
use crate::geometry::ViewSize;
use crate::session::{ScanEvent, ScanSession, ScanStats, ScanStatus, SessionState};
use crate::types::CameraDeviceInfo;
use std::sync::Arc;
use std::time::Duration;
use tauri::command;
use tokio::sync::RwLock;

lazy_static::lazy_static! {
    static ref ACTIVE_SESSION: SessionSlot = RwLock::new(None);
}

/// Longest a single `poll_scan_event` call may block
const MAX_POLL_MS: u64 = 5000;

async fn active_session() -> Result<Arc<ScanSession>, String> {
    ACTIVE_SESSION
        .read()
        .await
        .clone()
        .ok_or_else(|| "No scan session. Call start_scan first".to_string())
}

type SessionSlot = RwLock<Option<Arc<ScanSession>>>;

fn running(slot: &Option<Arc<ScanSession>>) -> bool {
    slot.as_ref()
        .map_or(false, |session| session.state() == SessionState::Started)
}

/// Put a started session into `slot` unless another one is running there.
/// The write lock is held only for the swap.
async fn install_session(slot: &SessionSlot, session: ScanSession) -> Result<ScanStatus, String> {
    let mut guard = slot.write().await;
    if running(&guard) {
        drop(guard);
        // Lost a race with another start; closing joins the worker.
        tokio::task::spawn_blocking(move || drop(session));
        return Err("A scan session is already running".to_string());
    }

    let status = session.status();
    let previous = guard.replace(Arc::new(session));
    drop(guard);
    if let Some(previous) = previous {
        // Dropping the last handle to a stopped session closes it.
        tokio::task::spawn_blocking(move || drop(previous));
    }
    Ok(status)
}

/// Start scanning with the global configuration.
///
/// `device_id` and `auto_capture` override the configured values for this
/// session only. The camera is opened without holding the session registry,
/// so status and event polls keep answering meanwhile.
#[command]
pub async fn start_scan(
    device_id: Option<String>,
    auto_capture: Option<bool>,
) -> Result<ScanStatus, String> {
    if running(&*ACTIVE_SESSION.read().await) {
        return Err("A scan session is already running".to_string());
    }

    let mut config = current_config();
    if device_id.is_some() {
        config.camera.device_id = device_id;
    }
    if let Some(enabled) = auto_capture {
        config.auto_capture.enabled = enabled;
    }

    let session = tokio::task::spawn_blocking(move || {
        let session = ScanSession::open(config)?;
        session.start()?;
        Ok::<_, crate::errors::ScanError>(session)
    })
    .await
    .map_err(|e| format!("Start task failed: {}", e))?
    .map_err(|e| {
        log::error!("Failed to start scan: {}", e);
        e.to_string()
    })?;

    install_session(&ACTIVE_SESSION, session).await
}

#[command]
pub async fn stop_scan() -> Result<ScanStats, String> {
    let session = ACTIVE_SESSION
        .write()
        .await
        .take()
        .ok_or_else(|| "No scan session to stop".to_string())?;

    tokio::task::spawn_blocking(move || {
        let timeout = Duration::from_millis(session.config().session.join_timeout_ms);
        session.close(timeout).map_err(|e| e.to_string())?;
        Ok::<_, String>(session.stats())
    })
    .await
    .map_err(|e| format!("Stop task failed: {}", e))?
}

#[command]
pub async fn set_auto_capture(enabled: bool) -> Result<(), String> {
    active_session()
        .await?
        .set_auto_capture(enabled)
        .map_err(|e| e.to_string())
}

#[command]
pub async fn get_scan_status() -> Result<ScanStatus, String> {
    Ok(active_session().await?.status())
}

/// Wait up to `timeout_ms` (default 0) for the next scan event.
#[command]
pub async fn poll_scan_event(timeout_ms: Option<u64>) -> Result<Option<ScanEvent>, String> {
    let session = active_session().await?;
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(0).min(MAX_POLL_MS));

    tokio::task::spawn_blocking(move || session.next_event(timeout))
        .await
        .map_err(|e| format!("Poll task failed: {}", e))?
        .map_err(|e| e.to_string())
}

#[command]
pub async fn request_manual_capture() -> Result<(), String> {
    active_session()
        .await?
        .request_capture()
        .map_err(|e| e.to_string())
}

/// Tell the worker the preview layout changed.
#[command]
pub async fn set_scan_view_size(width: f64, height: f64) -> Result<(), String> {
    if !(width > 0.0 && height > 0.0) {
        return Err(format!("Invalid view size {}x{}", width, height));
    }
    active_session()
        .await?
        .set_view_size(ViewSize::new(width, height))
        .map_err(|e| e.to_string())
}

#[command]
pub async fn list_scan_cameras() -> Result<Vec<CameraDeviceInfo>, String> {
    tokio::task::spawn_blocking(crate::platform::list_cameras)
        .await
        .map_err(|e| format!("Camera query task failed: {}", e))?
        .map_err(|e| e.to_string())
}
