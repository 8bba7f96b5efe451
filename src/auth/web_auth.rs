//! Usage: Interactive web-auth runtime (redirect URL + browser round trip).

use crate::auth::browser::open_browser;
use crate::auth::callback_server::{bind_callback_listener, wait_for_callback, BoundCallbackListener};
use crate::infra::settings::AppSettings;
use crate::shared::error::{codes, AppError, AppResult};
use futures_core::future::BoxFuture;
use std::time::Duration;
use tokio::sync::Mutex;

/// Host facilities for the interactive part of sign-in.
pub trait AuthRuntime: Send + Sync {
    /// Redirect URL the provider must send the user back to.
    fn redirect_url(&self) -> BoxFuture<'_, AppResult<String>>;

    /// Show `auth_url` to the user and wait for the final redirect.
    ///
    /// `Ok(None)` means the user abandoned the flow (window closed, timeout).
    fn launch_web_auth_flow<'a>(&'a self, auth_url: &'a str) -> BoxFuture<'a, AppResult<Option<String>>>;
}

/// Loopback runtime: a localhost listener receives the redirect.
pub struct LoopbackAuthRuntime {
    preferred_port: u16,
    callback_path: String,
    timeout: Option<Duration>,
    open_browser: bool,
    pending: Mutex<Option<BoundCallbackListener>>,
}

impl LoopbackAuthRuntime {
    pub fn new(
        preferred_port: u16,
        callback_path: impl Into<String>,
        timeout: Option<Duration>,
        open_browser: bool,
    ) -> Self {
        Self {
            preferred_port,
            callback_path: callback_path.into(),
            timeout,
            open_browser,
            pending: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        let timeout = match settings.interactive_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(u64::from(seconds))),
        };
        Self::new(
            settings.callback_port,
            settings.callback_path.clone(),
            timeout,
            settings.open_browser,
        )
    }
}

impl AuthRuntime for LoopbackAuthRuntime {
    fn redirect_url(&self) -> BoxFuture<'_, AppResult<String>> {
        Box::pin(async move {
            let mut pending = self.pending.lock().await;
            // A fresh listener per attempt; a stale one would hold the port.
            pending.take();
            let listener = bind_callback_listener(self.preferred_port, &self.callback_path).await?;
            let redirect_url = listener.redirect_url();
            tracing::debug!(port = listener.port(), "oauth callback listener bound");
            *pending = Some(listener);
            Ok(redirect_url)
        })
    }

    fn launch_web_auth_flow<'a>(&'a self, auth_url: &'a str) -> BoxFuture<'a, AppResult<Option<String>>> {
        Box::pin(async move {
            let listener = self.pending.lock().await.take().ok_or_else(|| {
                AppError::new(
                    codes::SYSTEM_ERROR,
                    "web auth launched before a redirect url was requested",
                )
            })?;

            let opened = self.open_browser && open_browser(auth_url);
            if !opened {
                tracing::warn!("open this url in a browser to sign in: {}", auth_url);
            }

            wait_for_callback(listener, self.timeout).await
        })
    }
}
