//! Usage: Persisted application settings (schema + read/write helpers + env overrides).

use crate::app_paths;
use crate::shared::error::{codes, AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CALLBACK_PORT: u16 = 53682;
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";
pub const DEFAULT_OAUTH_PROVIDER: &str = "google";
pub const DEFAULT_INTERACTIVE_TIMEOUT_SECONDS: u32 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u32 = 30;
const DEFAULT_LOG_RETENTION_DAYS: u32 = 14;
const MAX_INTERACTIVE_TIMEOUT_SECONDS: u32 = 60 * 60;
const MAX_REQUEST_TIMEOUT_SECONDS: u32 = 10 * 60;
const MAX_LOG_RETENTION_DAYS: u32 = 365;

pub const SUPABASE_URL_ENV: &str = "QUICKNOTES_SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "QUICKNOTES_SUPABASE_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub schema_version: u32,
    // Project URL, e.g. https://<ref>.supabase.co
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub oauth_provider: String,
    // Space separated, passed through to the provider.
    pub oauth_scopes: String,
    // 0 = pick a free port.
    pub callback_port: u16,
    pub callback_path: String,
    // 0 = wait until the user finishes or closes the flow.
    pub interactive_timeout_seconds: u32,
    pub request_timeout_seconds: u32,
    pub open_browser: bool,
    pub log_retention_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            oauth_provider: DEFAULT_OAUTH_PROVIDER.to_string(),
            oauth_scopes: String::new(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            interactive_timeout_seconds: DEFAULT_INTERACTIVE_TIMEOUT_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            open_browser: true,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl AppSettings {
    /// Fail with `CONFIG_ERROR` when the backend cannot be reached with these settings.
    pub fn require_backend(&self) -> AppResult<()> {
        let url = self.supabase_url.trim();
        if url.is_empty() {
            return Err(AppError::new(
                codes::CONFIG_ERROR,
                format!("supabase_url is not set (settings.json or {SUPABASE_URL_ENV})"),
            ));
        }
        if Url::parse(url).is_err() {
            return Err(AppError::new(
                codes::CONFIG_ERROR,
                format!("supabase_url is not a valid url: {url}"),
            ));
        }
        if self.supabase_anon_key.trim().is_empty() {
            return Err(AppError::new(
                codes::CONFIG_ERROR,
                format!("supabase_anon_key is not set (settings.json or {SUPABASE_ANON_KEY_ENV})"),
            ));
        }
        Ok(())
    }

    pub fn oauth_scopes(&self) -> Option<&str> {
        Some(self.oauth_scopes.trim()).filter(|v| !v.is_empty())
    }
}

fn sanitize_timeouts(settings: &mut AppSettings) -> bool {
    let mut changed = false;

    if settings.interactive_timeout_seconds > MAX_INTERACTIVE_TIMEOUT_SECONDS {
        settings.interactive_timeout_seconds = MAX_INTERACTIVE_TIMEOUT_SECONDS;
        changed = true;
    }
    if settings.request_timeout_seconds == 0 {
        settings.request_timeout_seconds = DEFAULT_REQUEST_TIMEOUT_SECONDS;
        changed = true;
    }
    if settings.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS {
        settings.request_timeout_seconds = MAX_REQUEST_TIMEOUT_SECONDS;
        changed = true;
    }

    changed
}

fn sanitize_callback(settings: &mut AppSettings) -> bool {
    let mut changed = false;

    if settings.callback_port != 0 && settings.callback_port < 1024 {
        settings.callback_port = DEFAULT_CALLBACK_PORT;
        changed = true;
    }
    let path = settings.callback_path.trim();
    if path.is_empty() || !path.starts_with('/') || path.contains(['?', '#']) {
        settings.callback_path = DEFAULT_CALLBACK_PATH.to_string();
        changed = true;
    }
    if settings.oauth_provider.trim().is_empty() {
        settings.oauth_provider = DEFAULT_OAUTH_PROVIDER.to_string();
        changed = true;
    }

    changed
}

fn sanitize_log_retention_days(settings: &mut AppSettings) -> bool {
    if settings.log_retention_days == 0 {
        settings.log_retention_days = DEFAULT_LOG_RETENTION_DAYS;
        return true;
    }
    if settings.log_retention_days > MAX_LOG_RETENTION_DAYS {
        settings.log_retention_days = MAX_LOG_RETENTION_DAYS;
        return true;
    }
    false
}

fn migrate_bump_schema_version(
    settings: &mut AppSettings,
    schema_version_present: bool,
    target_version: u32,
) -> bool {
    if schema_version_present && settings.schema_version >= target_version {
        return false;
    }
    settings.schema_version = target_version;
    true
}

fn parse_settings_json(content: &str) -> AppResult<(AppSettings, bool)> {
    let raw: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| format!("CONFIG_ERROR: failed to parse settings.json: {e}"))?;
    let schema_version_present = raw.get("schema_version").is_some();
    let settings: AppSettings = serde_json::from_value(raw)
        .map_err(|e| format!("CONFIG_ERROR: failed to parse settings.json: {e}"))?;
    Ok((settings, schema_version_present))
}

fn apply_env_overrides(settings: &mut AppSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(SUPABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        settings.supabase_url = url.trim().to_string();
    }
    if let Some(key) = lookup(SUPABASE_ANON_KEY_ENV).filter(|v| !v.trim().is_empty()) {
        settings.supabase_anon_key = key.trim().to_string();
    }
}

/// Read `settings.json` from `data_dir`, creating it with defaults on first run.
///
/// Repaired values are written back; environment overrides are applied to the
/// returned value only and never persisted.
pub fn read(data_dir: &Path) -> AppResult<AppSettings> {
    let path = app_paths::settings_path(data_dir);

    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("STORAGE_ERROR: failed to read settings: {e}"))?;
        let (mut settings, schema_version_present) = parse_settings_json(&content)?;

        let mut repaired = false;
        repaired |= migrate_bump_schema_version(&mut settings, schema_version_present, SCHEMA_VERSION);
        repaired |= sanitize_timeouts(&mut settings);
        repaired |= sanitize_callback(&mut settings);
        repaired |= sanitize_log_retention_days(&mut settings);
        if repaired {
            tracing::info!(path = %path.display(), "settings repaired; writing back");
            if let Err(err) = write(data_dir, &settings) {
                tracing::warn!("failed to persist repaired settings: {}", err);
            }
        }
        settings
    } else {
        let settings = AppSettings::default();
        // First run: write defaults so the file is discoverable and editable.
        if let Err(err) = write(data_dir, &settings) {
            tracing::warn!("failed to create default settings.json: {}", err);
        }
        settings
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn write(data_dir: &Path, settings: &AppSettings) -> AppResult<AppSettings> {
    if settings.callback_port != 0 && settings.callback_port < 1024 {
        return Err("INVALID_INPUT: callback_port must be 0 or between 1024 and 65535".into());
    }
    if settings.log_retention_days == 0 {
        return Err("INVALID_INPUT: log_retention_days must be >= 1".into());
    }
    if settings.request_timeout_seconds == 0 {
        return Err("INVALID_INPUT: request_timeout_seconds must be >= 1".into());
    }

    let path = app_paths::settings_path(data_dir);
    let tmp_path = path.with_file_name("settings.json.tmp");
    let backup_path = path.with_file_name("settings.json.bak");

    let content = serde_json::to_vec_pretty(settings)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize settings: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("STORAGE_ERROR: failed to write temp settings file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(&path, &backup_path)
            .map_err(|e| format!("STORAGE_ERROR: failed to create settings backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::rename(&backup_path, &path);
        return Err(format!("STORAGE_ERROR: failed to finalize settings: {e}").into());
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(settings.clone())
}
