//! Usage: Run blocking work (file I/O) on the tokio blocking pool with a stable label.

use crate::shared::error::{codes, AppError, AppResult};

pub async fn run<T, E>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(join_err) => {
            // Panic payloads may contain note content; only the label is reported.
            if join_err.is_panic() {
                tracing::error!(label, "blocking task panicked");
                return Err(AppError::new(
                    codes::SYSTEM_ERROR,
                    format!("{label}: task panicked"),
                ));
            }

            tracing::warn!(label, "blocking task cancelled");
            Err(AppError::new(
                codes::SYSTEM_ERROR,
                format!("{label}: task cancelled"),
            ))
        }
    }
}
