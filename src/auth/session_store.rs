//! Usage: Persist and restore the session token pair in a single storage slot.

use crate::auth::session::Session;
use crate::infra::storage::KeyValueStorage;
use crate::shared::error::AppResult;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const SESSION_SLOT: &str = "session";

#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Session persistence. No caching: every call goes to the storage.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Overwrite the slot with `session` (last write wins).
    pub async fn save(&self, session: &Session) -> AppResult<()> {
        let value = json!({
            "access_token": session.access_token(),
            "refresh_token": session.refresh_token(),
        });
        self.storage.set(SESSION_SLOT, value).await?;
        tracing::debug!("session saved to local storage");
        Ok(())
    }

    /// The stored session, or `None` when the slot is empty, partial or malformed.
    pub async fn load(&self) -> AppResult<Option<Session>> {
        let Some(value) = self.storage.get(SESSION_SLOT).await? else {
            return Ok(None);
        };

        let stored: StoredSession = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("stored session is malformed; treating as signed out: {}", err);
                return Ok(None);
            }
        };

        Ok(match (stored.access_token, stored.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Session::new(access_token, refresh_token),
            _ => None,
        })
    }

    pub async fn clear(&self) -> AppResult<()> {
        self.storage.remove(SESSION_SLOT).await?;
        tracing::debug!("session removed from local storage");
        Ok(())
    }
}
