//! Usage: Session and user types shared by the auth flow, session store and backends.

use crate::shared::security::mask_token;
use serde::{Deserialize, Serialize};

/// Access/refresh token pair. Both fields are non-empty by construction.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    access_token: String,
    refresh_token: String,
}

impl Session {
    /// `None` when either token is blank.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Option<Self> {
        let access_token = access_token.into().trim().to_string();
        let refresh_token = refresh_token.into().trim().to_string();
        if access_token.is_empty() || refresh_token.is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A session accepted by the identity backend, with the user it belongs to.
///
/// `session` can differ from the pair that was offered when the backend had to
/// refresh an expired access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledSession {
    pub session: Session,
    pub user: AuthUser,
}
