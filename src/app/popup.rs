//! Usage: Popup session (mirrors the signed-in user and note list, dispatches messages).

use crate::app::app_state::AppState;
use crate::app::messages::{PopupMessage, PopupReply};
use crate::auth::events::AuthEvent;
use crate::auth::session::AuthUser;
use crate::domain::notes::Note;
use crate::shared::error::{codes, AppError, AppResult};
use tokio::sync::broadcast::{self, error::TryRecvError};

pub struct PopupSession {
    state: AppState,
    events: broadcast::Receiver<AuthEvent>,
    user: Option<AuthUser>,
    notes: Vec<Note>,
    // Set once the current user's list has been fetched; an empty list counts.
    notes_loaded: bool,
}

impl PopupSession {
    pub fn new(state: AppState) -> Self {
        let events = state.events.subscribe();
        Self {
            state,
            events,
            user: None,
            notes: Vec::new(),
            notes_loaded: false,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Restore the stored session and load the notes of whoever is signed in.
    pub async fn init(&mut self) -> PopupReply {
        let result = self.restore_and_load().await;
        self.reply("INIT", result)
    }

    async fn restore_and_load(&mut self) -> AppResult<PopupReply> {
        self.state.controller.restore_session().await?;
        self.apply_pending_events().await?;
        self.refresh_user().await?;
        if self.user.is_some() && !self.notes_loaded {
            self.reload_notes().await?;
        }
        Ok(self.snapshot())
    }

    pub async fn handle(&mut self, message: PopupMessage) -> PopupReply {
        let kind = message.kind();
        let result = self.dispatch(message).await;
        self.reply(kind, result)
    }

    fn reply(&self, kind: &str, result: AppResult<PopupReply>) -> PopupReply {
        if let Err(err) = &result {
            tracing::warn!(request = kind, code = err.code(), "popup message failed: {}", err.message());
        }
        result.into()
    }

    async fn dispatch(&mut self, message: PopupMessage) -> AppResult<PopupReply> {
        match message {
            PopupMessage::Login => {
                self.state.controller.sign_in().await?;
                self.apply_pending_events().await?;
                Ok(self.snapshot())
            }
            PopupMessage::Logout => {
                self.state.controller.sign_out().await?;
                self.apply_pending_events().await?;
                Ok(PopupReply::ok())
            }
            PopupMessage::GetUser => {
                self.apply_pending_events().await?;
                self.refresh_user().await?;
                Ok(PopupReply::ok().with_user(self.user.clone()))
            }
            PopupMessage::ListNotes => {
                self.reload_notes().await?;
                Ok(PopupReply::ok().with_notes(self.notes.clone()))
            }
            PopupMessage::AddNote { content } => {
                let user_id = self
                    .user
                    .as_ref()
                    .map(|user| user.id.clone())
                    .ok_or_else(|| AppError::new(codes::INVALID_INPUT, "sign in before adding notes"))?;
                self.state.notes.add(&user_id, &content).await?;
                self.reload_notes().await?;
                Ok(PopupReply::ok().with_notes(self.notes.clone()))
            }
            PopupMessage::UpdateNote { id, content } => {
                self.state.notes.update(&id, &content).await?;
                self.reload_notes().await?;
                Ok(PopupReply::ok().with_notes(self.notes.clone()))
            }
            PopupMessage::DeleteNote { id } => {
                self.state.notes.remove(&id).await?;
                self.reload_notes().await?;
                Ok(PopupReply::ok().with_notes(self.notes.clone()))
            }
        }
    }

    fn snapshot(&self) -> PopupReply {
        let reply = PopupReply::ok().with_user(self.user.clone());
        if self.user.is_some() {
            reply.with_notes(self.notes.clone())
        } else {
            reply
        }
    }

    async fn refresh_user(&mut self) -> AppResult<()> {
        self.user = self.state.controller.current_user().await?;
        if self.user.is_none() {
            self.forget_notes();
        }
        Ok(())
    }

    async fn reload_notes(&mut self) -> AppResult<()> {
        self.notes = self.state.notes.list().await?;
        self.notes_loaded = true;
        Ok(())
    }

    fn forget_notes(&mut self) {
        self.notes.clear();
        self.notes_loaded = false;
    }

    /// Apply auth events published since the last call.
    async fn apply_pending_events(&mut self) -> AppResult<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply_event(event).await?,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "popup missed auth events; resyncing user");
                    self.refresh_user().await?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
            }
        }
    }

    async fn apply_event(&mut self, event: AuthEvent) -> AppResult<()> {
        match event {
            AuthEvent::SignedIn(user) | AuthEvent::SessionRestored(user) => {
                self.user = Some(user);
                self.reload_notes().await
            }
            AuthEvent::SignedOut => {
                self.user = None;
                self.forget_notes();
                Ok(())
            }
        }
    }
}
