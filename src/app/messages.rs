//! Usage: Popup message protocol (closed request enum + reply envelope).

use crate::auth::session::AuthUser;
use crate::domain::notes::Note;
use crate::shared::error::{codes, AppError, AppResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PopupMessage {
    Login,
    Logout,
    GetUser,
    ListNotes,
    AddNote { content: String },
    UpdateNote { id: String, content: String },
    DeleteNote { id: String },
}

impl PopupMessage {
    pub fn decode(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            AppError::new(codes::INVALID_INPUT, format!("invalid popup message: {e}"))
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PopupMessage::Login => "LOGIN",
            PopupMessage::Logout => "LOGOUT",
            PopupMessage::GetUser => "GET_USER",
            PopupMessage::ListNotes => "LIST_NOTES",
            PopupMessage::AddNote { .. } => "ADD_NOTE",
            PopupMessage::UpdateNote { .. } => "UPDATE_NOTE",
            PopupMessage::DeleteNote { .. } => "DELETE_NOTE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ReplyError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl PopupReply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            user: None,
            notes: None,
            error: None,
        }
    }

    pub fn with_user(mut self, user: Option<AuthUser>) -> Self {
        self.user = user;
        self
    }

    pub fn with_notes(mut self, notes: Vec<Note>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn failure(err: &AppError) -> Self {
        Self {
            ok: false,
            user: None,
            notes: None,
            error: Some(err.into()),
        }
    }
}

impl From<AppResult<PopupReply>> for PopupReply {
    fn from(result: AppResult<PopupReply>) -> Self {
        match result {
            Ok(reply) => reply,
            Err(err) => PopupReply::failure(&err),
        }
    }
}
