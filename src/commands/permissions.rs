use crate::permissions::{check_permission_detailed, PermissionInfo};
use tauri::command;

/// Current camera permission, with guidance when access is missing
#[command]
pub async fn check_scan_permission() -> Result<PermissionInfo, String> {
    let info = tokio::task::spawn_blocking(check_permission_detailed)
        .await
        .map_err(|e| format!("Permission check task failed: {}", e))?;
    log::info!("Camera permission: {}", info.status);
    Ok(info)
}
