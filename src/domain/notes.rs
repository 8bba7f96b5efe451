//! Usage: Notes table access over PostgREST (list / add / update / remove).

use crate::auth::identity::IdentityBackend;
use crate::infra::supabase_http::{error_from_response, SupabaseProject};
use crate::shared::error::{codes, AppError, AppResult};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const NOTES_PATH: &str = "rest/v1/notes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Opaque; the table may use a bigint or uuid key.
    #[serde(deserialize_with = "deserialize_note_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_nullable_text")]
    pub user_id: String,
    #[serde(default, deserialize_with = "deserialize_nullable_text")]
    pub content: String,
}

fn deserialize_note_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "note id must be a string or number, got {other}"
        ))),
    }
}

/// `null` columns read as empty text.
fn deserialize_nullable_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn require_present<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::new(
            codes::INVALID_INPUT,
            format!("{field} is required"),
        ));
    }
    Ok(value)
}

/// Remote notes table. Every call is a single round trip authorized with the
/// backend's active session.
#[derive(Clone)]
pub struct NotesRepository {
    project: SupabaseProject,
    backend: Arc<dyn IdentityBackend>,
}

impl NotesRepository {
    pub fn new(project: SupabaseProject, backend: Arc<dyn IdentityBackend>) -> Self {
        Self { project, backend }
    }

    fn headers(&self) -> AppResult<HeaderMap> {
        let access_token = self.backend.access_token();
        self.project.headers(access_token.as_deref())
    }

    fn notes_url(&self, id: Option<&str>) -> AppResult<Url> {
        let mut url = self.project.endpoint(NOTES_PATH)?;
        if let Some(id) = id {
            url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        }
        Ok(url)
    }

    async fn send(&self, operation: &str, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| {
                AppError::new(codes::REPOSITORY_ERROR, format!("{operation} request failed: {e}")).with_source(e)
            })?;

        if !response.status().is_success() {
            let err = error_from_response(codes::REPOSITORY_ERROR, operation, response).await;
            tracing::warn!(operation, "notes request failed: {}", err.message());
            return Err(err);
        }
        Ok(response)
    }

    /// All notes visible to the current session (row-level security decides).
    pub async fn list(&self) -> AppResult<Vec<Note>> {
        let mut url = self.notes_url(None)?;
        url.query_pairs_mut().append_pair("select", "*");

        let response = self
            .send("list notes", self.project.client().get(url))
            .await?;
        let notes: Vec<Note> = response
            .json()
            .await
            .map_err(|e| format!("REPOSITORY_ERROR: list notes response json invalid: {e}"))?;

        tracing::debug!(count = notes.len(), "notes listed");
        Ok(notes)
    }

    pub async fn add(&self, user_id: &str, content: &str) -> AppResult<()> {
        let user_id = require_present("user_id", user_id)?;
        let body = json!({ "user_id": user_id, "content": content });

        self.send(
            "add note",
            self.project.client().post(self.notes_url(None)?).json(&body),
        )
        .await?;
        tracing::debug!(user_id, "note added");
        Ok(())
    }

    pub async fn update(&self, id: &str, content: &str) -> AppResult<()> {
        let id = require_present("id", id)?;
        let body = json!({ "content": content });

        self.send(
            "update note",
            self.project.client().patch(self.notes_url(Some(id))?).json(&body),
        )
        .await?;
        tracing::debug!(note_id = id, "note updated");
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> AppResult<()> {
        let id = require_present("id", id)?;

        self.send(
            "delete note",
            self.project.client().delete(self.notes_url(Some(id))?),
        )
        .await?;
        tracing::debug!(note_id = id, "note deleted");
        Ok(())
    }
}
