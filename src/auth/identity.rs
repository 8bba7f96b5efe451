//! Usage: IdentityBackend trait - the identity-provider surface the auth flow depends on.

use crate::auth::session::{AuthUser, InstalledSession, Session};
use crate::shared::error::AppResult;
use futures_core::future::BoxFuture;

/// Parameters for building the provider authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    /// Provider key as the backend knows it (e.g., "google").
    pub provider: String,
    /// Where the provider sends the user back with the tokens.
    pub redirect_to: String,
    pub scopes: Option<String>,
}

/// Session-aware identity backend.
///
/// Implementations hold at most one active session. The trait is object-safe so
/// the controller can run against `Arc<dyn IdentityBackend>`.
pub trait IdentityBackend: Send + Sync {
    /// Authorization URL for `request`. Never navigates anywhere; the caller
    /// drives the interactive part.
    fn authorize_url(&self, request: &AuthorizeRequest) -> AppResult<String>;

    /// Validate `session` and make it the active one.
    fn set_session<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, AppResult<InstalledSession>>;

    /// Invalidate the active session remotely and drop it locally.
    /// The local part always happens, even when the remote call fails.
    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>>;

    /// Drop the active session locally without contacting the backend.
    fn clear_session(&self);

    /// User of the active session, `None` when signed out.
    fn get_user(&self) -> BoxFuture<'_, AppResult<Option<AuthUser>>>;

    /// Access token of the active session, for data API calls.
    fn access_token(&self) -> Option<String>;
}
