use crate::config::ScannerConfig;
use std::sync::{Arc, RwLock};
use tauri::command;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Arc<RwLock<ScannerConfig>> = Arc::new(RwLock::new(ScannerConfig::load_or_default()));
}

/// Snapshot of the configuration new scan sessions start from
pub fn current_config() -> ScannerConfig {
    match GLOBAL_CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[command]
pub async fn get_scan_config() -> Result<ScannerConfig, String> {
    let config = GLOBAL_CONFIG.read().map_err(|e| e.to_string())?;
    Ok(config.clone())
}

/// Validate, apply and persist a new configuration. Running sessions keep
/// the configuration they were started with.
#[command]
pub async fn update_scan_config(new_config: ScannerConfig) -> Result<(), String> {
    new_config.validate()?;

    {
        let mut config = GLOBAL_CONFIG.write().map_err(|e| e.to_string())?;
        *config = new_config.clone();
    }

    new_config
        .save_to_file(ScannerConfig::default_path())
        .map_err(|e| e.to_string())?;

    Ok(())
}

#[command]
pub async fn reset_scan_config() -> Result<ScannerConfig, String> {
    let default_config = ScannerConfig::default();

    {
        let mut config = GLOBAL_CONFIG
            .write()
            .map_err(|e| format!("Failed to write config: {}", e))?;
        *config = default_config.clone();
    }

    default_config
        .save_to_file(ScannerConfig::default_path())
        .map_err(|e| e.to_string())?;

    Ok(default_config)
}
