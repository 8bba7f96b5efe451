//! Usage: Process-wide tracing setup (stderr + daily rolling file) and panic hook.

use crate::app_paths;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "quicknotes";
const DEFAULT_FILTER: &str = "info";

/// Keeps the background file writer alive; drop it only at exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub(crate) fn rolling_file_appender(
    data_dir: &Path,
    retention_days: u32,
) -> Result<RollingFileAppender, String> {
    let dir = app_paths::logs_dir(data_dir);
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("failed to create log dir {}: {e}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(retention_days.max(1) as usize)
        .build(&dir)
        .map_err(|e| format!("failed to open log file in {}: {e}", dir.display()))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// keep the first subscriber.
pub fn init(data_dir: &Path, retention_days: u32) -> LoggingGuard {
    let (file_layer, file_guard, file_error) = match rolling_file_appender(data_dir, retention_days) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return LoggingGuard { _file: file_guard };
    }
    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge already installed: {}", err);
    }
    if let Some(err) = file_error {
        tracing::warn!("file logging disabled: {}", err);
    }

    install_panic_hook();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        retention_days,
        "logging initialized"
    );
    LoggingGuard { _file: file_guard }
}

fn install_panic_hook() {
    // Payload is not logged; it can carry note contents or tokens.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: quicknotes panicked at {location}");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_file_appender_creates_logs_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        rolling_file_appender(dir.path(), 0).expect("appender");
        assert!(app_paths::logs_dir(dir.path()).is_dir());
    }
}
