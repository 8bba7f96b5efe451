//! Usage: Resolve the app data directory (settings, storage, logs).

use crate::shared::error::{codes, AppError, AppResult};
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "QUICKNOTES_DATA_DIR";
const APP_DIR_NAME: &str = "quicknotes";

pub fn app_data_dir() -> AppResult<PathBuf> {
    let dir = match std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        Some(custom) => PathBuf::from(custom),
        None => dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| {
                AppError::new(codes::CONFIG_ERROR, "unable to resolve a data directory")
            })?
            .join(APP_DIR_NAME),
    };

    std::fs::create_dir_all(&dir).map_err(|e| {
        AppError::new(
            codes::STORAGE_ERROR,
            format!("failed to create data dir {}: {e}", dir.display()),
        )
    })?;
    Ok(dir)
}

pub fn settings_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn storage_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("storage.json")
}

pub fn logs_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("logs")
}
