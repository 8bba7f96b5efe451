//! Usage: Auth flow orchestration (sign-in, sign-out, session restore).
//!
//! Sign-in ordering: extract -> install -> persist -> publish. Any failure
//! before persistence leaves storage untouched and publishes nothing; a failed
//! persist drops the freshly installed session again.

use crate::auth::events::{AuthEvent, AuthEvents};
use crate::auth::identity::{AuthorizeRequest, IdentityBackend};
use crate::auth::session::{AuthUser, Session};
use crate::auth::session_store::SessionStore;
use crate::auth::token_extractor::extract_session;
use crate::auth::web_auth::AuthRuntime;
use crate::infra::settings::AppSettings;
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlowState {
    Idle,
    AwaitingRedirect,
    AwaitingUserInteraction,
    ExchangingTokens,
    Installed,
    Failed,
}

impl AuthFlowState {
    fn in_progress(self) -> bool {
        matches!(
            self,
            AuthFlowState::AwaitingRedirect
                | AuthFlowState::AwaitingUserInteraction
                | AuthFlowState::ExchangingTokens
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFlowOptions {
    pub provider: String,
    pub scopes: Option<String>,
}

impl AuthFlowOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            provider: settings.oauth_provider.trim().to_string(),
            scopes: settings.oauth_scopes().map(str::to_string),
        }
    }
}

pub struct AuthFlowController {
    backend: Arc<dyn IdentityBackend>,
    runtime: Arc<dyn AuthRuntime>,
    store: SessionStore,
    events: AuthEvents,
    options: AuthFlowOptions,
    state: Mutex<AuthFlowState>,
}

impl AuthFlowController {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        runtime: Arc<dyn AuthRuntime>,
        store: SessionStore,
        events: AuthEvents,
        options: AuthFlowOptions,
    ) -> Self {
        Self {
            backend,
            runtime,
            store,
            events,
            options,
            state: Mutex::new(AuthFlowState::Idle),
        }
    }

    /// State of the most recent flow.
    pub fn flow_state(&self) -> AuthFlowState {
        *self.state.lock_or_recover()
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    fn set_state(&self, next: AuthFlowState) {
        let previous = self.state.replace_or_recover(next);
        tracing::debug!(from = ?previous, to = ?next, "auth flow state");
    }

    fn begin_flow(&self) -> AppResult<()> {
        let mut state = self.state.lock_or_recover();
        if state.in_progress() {
            return Err(AppError::new(
                codes::INVALID_INPUT,
                "a sign-in flow is already in progress",
            ));
        }
        *state = AuthFlowState::AwaitingRedirect;
        Ok(())
    }

    /// Run the interactive OAuth flow and install + persist the resulting session.
    pub async fn sign_in(&self) -> AppResult<AuthUser> {
        self.begin_flow()?;

        match self.run_sign_in().await {
            Ok(user) => {
                self.set_state(AuthFlowState::Installed);
                tracing::info!(user_id = %user.id, provider = %self.options.provider, "sign-in completed");
                self.events.publish(AuthEvent::SignedIn(user.clone()));
                Ok(user)
            }
            Err(err) => {
                self.set_state(AuthFlowState::Failed);
                tracing::warn!(code = err.code(), "sign-in failed: {}", err.message());
                Err(err)
            }
        }
    }

    async fn run_sign_in(&self) -> AppResult<AuthUser> {
        let redirect_to = self.runtime.redirect_url().await?;
        let auth_url = self.backend.authorize_url(&AuthorizeRequest {
            provider: self.options.provider.clone(),
            redirect_to,
            scopes: self.options.scopes.clone(),
        })?;

        self.set_state(AuthFlowState::AwaitingUserInteraction);
        let callback_url = self
            .runtime
            .launch_web_auth_flow(&auth_url)
            .await?
            .ok_or_else(|| {
                AppError::new(
                    codes::OAUTH_ABORTED,
                    "sign-in window closed before completing",
                )
            })?;

        self.set_state(AuthFlowState::ExchangingTokens);
        let session = extract_session(&callback_url)?;
        let installed = self.backend.set_session(&session).await?;
        self.persist_installed(&installed.session).await?;
        Ok(installed.user)
    }

    /// Persist the session the backend just installed, or uninstall it on failure.
    async fn persist_installed(&self, session: &Session) -> AppResult<()> {
        if let Err(err) = self.store.save(session).await {
            tracing::warn!(code = err.code(), "session not persisted; dropping installed session");
            self.backend.clear_session();
            return Err(err);
        }
        Ok(())
    }

    /// Sign out remotely (best effort) and clear the stored session.
    pub async fn sign_out(&self) -> AppResult<()> {
        if let Err(err) = self.backend.sign_out().await {
            tracing::warn!(code = err.code(), "remote sign-out failed; clearing local session anyway: {}", err.message());
        }
        self.store.clear().await?;
        self.set_state(AuthFlowState::Idle);
        tracing::info!("signed out");
        self.events.publish(AuthEvent::SignedOut);
        Ok(())
    }

    /// Reinstall the persisted session, if any.
    ///
    /// A stored pair the backend rejects is cleared before the error propagates.
    /// Transport failures leave the slot alone so the next start can retry.
    pub async fn restore_session(&self) -> AppResult<Option<AuthUser>> {
        let Some(stored) = self.store.load().await? else {
            tracing::debug!("no stored session to restore");
            return Ok(None);
        };

        let installed = match self.backend.set_session(&stored).await {
            Ok(installed) => installed,
            Err(err) if err.is(codes::SESSION_REJECTED) => {
                tracing::warn!(code = err.code(), "stored session rejected; clearing it: {}", err.message());
                self.store.clear().await?;
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(code = err.code(), "session restore failed; keeping stored session: {}", err.message());
                return Err(err);
            }
        };

        self.persist_installed(&installed.session).await?;
        self.set_state(AuthFlowState::Installed);
        tracing::info!(user_id = %installed.user.id, "session restored");
        self.events
            .publish(AuthEvent::SessionRestored(installed.user.clone()));
        Ok(Some(installed.user))
    }

    pub async fn current_user(&self) -> AppResult<Option<AuthUser>> {
        self.backend.get_user().await
    }
}
