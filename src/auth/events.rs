//! Usage: Session-change notifications (signed in / restored / signed out).

use crate::auth::session::AuthUser;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SessionRestored(AuthUser),
    SignedOut,
}

impl AuthEvent {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            AuthEvent::SignedIn(user) | AuthEvent::SessionRestored(user) => Some(user),
            AuthEvent::SignedOut => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::SessionRestored(_) => "session_restored",
            AuthEvent::SignedOut => "signed_out",
        }
    }
}

/// Fan-out hub. Publishing with no subscribers is fine; lagging subscribers
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: AuthEvent) {
        let kind = event.kind();
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::debug!(event = kind, receivers, "auth event published");
    }
}
