//! Usage: Supabase Auth (GoTrue) implementation of `IdentityBackend`.

use crate::auth::identity::{AuthorizeRequest, IdentityBackend};
use crate::auth::session::{AuthUser, InstalledSession, Session};
use crate::infra::supabase_http::{error_from_response, SupabaseProject};
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use futures_core::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;

const AUTHORIZE_PATH: &str = "auth/v1/authorize";
const USER_PATH: &str = "auth/v1/user";
const TOKEN_PATH: &str = "auth/v1/token";
const LOGOUT_PATH: &str = "auth/v1/logout";

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserResponse> for AuthUser {
    fn from(value: UserResponse) -> Self {
        AuthUser {
            id: value.id,
            email: value.email.filter(|v| !v.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Connection, timeout and TLS failures: the backend never judged the tokens.
fn transport_error(operation: &str, err: reqwest::Error) -> AppError {
    AppError::new(codes::BACKEND_ERROR, format!("{operation} request failed: {err}")).with_source(err)
}

enum UserLookup {
    Found(AuthUser),
    Unauthorized,
}

pub struct SupabaseAuth {
    project: SupabaseProject,
    active: Mutex<Option<InstalledSession>>,
}

impl SupabaseAuth {
    pub fn new(project: SupabaseProject) -> Self {
        Self {
            project,
            active: Mutex::new(None),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> AppResult<UserLookup> {
        let response = self
            .project
            .client()
            .get(self.project.endpoint(USER_PATH)?)
            .headers(self.project.headers(Some(access_token))?)
            .send()
            .await
            .map_err(|e| transport_error("get user", e))?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Ok(UserLookup::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(error_from_response(codes::BACKEND_ERROR, "get user", response).await);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| format!("BACKEND_ERROR: get user response json invalid: {e}"))?;
        Ok(UserLookup::Found(user.into()))
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<Session> {
        let mut url = self.project.endpoint(TOKEN_PATH)?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .project
            .client()
            .post(url)
            .headers(self.project.headers(None)?)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| transport_error("token refresh", e))?;

        let status = response.status();
        // GoTrue answers invalid_grant with 400; anything in this band means the pair is dead.
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(error_from_response(codes::SESSION_REJECTED, "token refresh", response).await);
        }
        if !status.is_success() {
            return Err(error_from_response(codes::BACKEND_ERROR, "token refresh", response).await);
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| format!("BACKEND_ERROR: token refresh response json invalid: {e}"))?;

        match (body.access_token, body.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Session::new(access_token, refresh_token),
            _ => None,
        }
        .ok_or_else(|| {
            AppError::new(
                codes::BACKEND_ERROR,
                "token refresh response missing access_token/refresh_token",
            )
        })
    }

    async fn install(&self, session: &Session) -> AppResult<InstalledSession> {
        if let UserLookup::Found(user) = self.fetch_user(session.access_token()).await? {
            return Ok(InstalledSession {
                session: session.clone(),
                user,
            });
        }

        tracing::info!("access token rejected; refreshing session once");
        let refreshed = self.refresh(session.refresh_token()).await?;
        match self.fetch_user(refreshed.access_token()).await? {
            UserLookup::Found(user) => Ok(InstalledSession {
                session: refreshed,
                user,
            }),
            UserLookup::Unauthorized => Err(AppError::new(
                codes::SESSION_REJECTED,
                "refreshed access token was rejected",
            )),
        }
    }

    async fn remote_logout(&self, access_token: &str) -> AppResult<()> {
        let response = self
            .project
            .client()
            .post(self.project.endpoint(LOGOUT_PATH)?)
            .headers(self.project.headers(Some(access_token))?)
            .send()
            .await
            .map_err(|e| transport_error("logout", e))?;

        let status = response.status();
        // Expired or already revoked sessions count as signed out.
        if status.is_success()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::NOT_FOUND
        {
            return Ok(());
        }
        Err(error_from_response(codes::BACKEND_ERROR, "logout", response).await)
    }
}

impl IdentityBackend for SupabaseAuth {
    fn authorize_url(&self, request: &AuthorizeRequest) -> AppResult<String> {
        let provider = request.provider.trim();
        if provider.is_empty() {
            return Err(AppError::new(codes::INVALID_INPUT, "oauth provider is empty"));
        }
        let redirect_to = request.redirect_to.trim();
        if redirect_to.is_empty() {
            return Err(AppError::new(codes::INVALID_INPUT, "redirect url is empty"));
        }

        let mut url = self.project.endpoint(AUTHORIZE_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", provider);
            query.append_pair("redirect_to", redirect_to);
            if let Some(scopes) = request.scopes.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                query.append_pair("scopes", scopes);
            }
        }
        Ok(url.to_string())
    }

    fn set_session<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, AppResult<InstalledSession>> {
        Box::pin(async move {
            let installed = self.install(session).await?;
            tracing::info!(user_id = %installed.user.id, "session installed");
            self.active.replace_or_recover(Some(installed.clone()));
            Ok(installed)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async move {
            let Some(active) = self.active.replace_or_recover(None) else {
                return Ok(());
            };
            self.remote_logout(active.session.access_token()).await
        })
    }

    fn clear_session(&self) {
        if self.active.replace_or_recover(None).is_some() {
            tracing::info!("active session dropped locally");
        }
    }

    fn get_user(&self) -> BoxFuture<'_, AppResult<Option<AuthUser>>> {
        Box::pin(async move {
            let Some(access_token) = self.access_token() else {
                return Ok(None);
            };
            match self.fetch_user(&access_token).await? {
                UserLookup::Found(user) => Ok(Some(user)),
                UserLookup::Unauthorized => Err(AppError::new(
                    codes::SESSION_REJECTED,
                    "active session is no longer valid; sign in again",
                )),
            }
        })
    }

    fn access_token(&self) -> Option<String> {
        self.active
            .lock_or_recover()
            .as_ref()
            .map(|installed| installed.session.access_token().to_string())
    }
}
