#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use quicknotes_lib::infra::settings::AppSettings;
use quicknotes_lib::infra::supabase_http::SupabaseProject;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const USER_ID: &str = "user-1";
pub const USER_EMAIL: &str = "a@example.com";

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serializes env mutation across tests and restores the previous values on drop.
pub struct TestEnv {
    saved: Vec<(&'static str, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            saved: Vec::new(),
            _lock: env_lock(),
        }
    }

    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    pub fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct FakeState {
    accepted_tokens: HashSet<String>,
    refresh_grants: HashMap<String, (String, String)>,
    notes: Vec<Value>,
    next_id: i64,
    logout_status: Option<StatusCode>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<FakeState>>;

fn lock(state: &Shared) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn record(state: &Shared, method: Method, uri: &Uri, headers: &HeaderMap, body: &str) {
    lock(state).requests.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        apikey: header(headers, "apikey"),
        authorization: header(headers, "authorization"),
        body: body.to_string(),
    });
}

fn bearer_accepted(state: &Shared, headers: &HeaderMap) -> bool {
    let token = header(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string))
        .unwrap_or_default();
    lock(state).accepted_tokens.contains(&token)
}

fn id_filter(query: &HashMap<String, String>) -> Option<String> {
    query
        .get("id")
        .and_then(|v| v.strip_prefix("eq."))
        .map(str::to_string)
}

fn note_id_string(note: &Value) -> String {
    match &note["id"] {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

async fn get_user(State(state): State<Shared>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    record(&state, method, &uri, &headers, "");
    if !bearer_accepted(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": 401, "error_code": "bad_jwt", "msg": "invalid JWT"})),
        )
            .into_response();
    }
    Json(json!({"id": USER_ID, "email": USER_EMAIL, "aud": "authenticated"})).into_response()
}

async fn token(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    record(&state, method, &uri, &headers, &body);
    let refresh_token = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["refresh_token"].as_str().map(str::to_string))
        .unwrap_or_default();

    let grant = lock(&state).refresh_grants.get(&refresh_token).cloned();
    match grant {
        Some((access_token, next_refresh)) => {
            lock(&state).accepted_tokens.insert(access_token.clone());
            Json(json!({
                "access_token": access_token,
                "refresh_token": next_refresh,
                "token_type": "bearer",
                "expires_in": 3600
            }))
            .into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Invalid Refresh Token"})),
        )
            .into_response(),
    }
}

async fn logout(State(state): State<Shared>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    record(&state, method, &uri, &headers, "");
    let status = lock(&state).logout_status.unwrap_or(StatusCode::NO_CONTENT);
    if status.is_success() {
        return status.into_response();
    }
    (status, Json(json!({"msg": "logout failed"}))).into_response()
}

async fn list_notes(State(state): State<Shared>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    record(&state, method, &uri, &headers, "");
    if !bearer_accepted(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "PGRST301", "details": null, "hint": null, "message": "JWT expired"})),
        )
            .into_response();
    }
    Json(Value::Array(lock(&state).notes.clone())).into_response()
}

async fn add_note(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    record(&state, method, &uri, &headers, &body);
    let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    if value["content"] == "forbidden" || !bearer_accepted(&state, &headers) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "code": "42501",
                "details": null,
                "hint": null,
                "message": "new row violates row-level security policy for table \"notes\""
            })),
        )
            .into_response();
    }

    let mut guard = lock(&state);
    guard.next_id += 1;
    let id = guard.next_id;
    guard.notes.push(json!({
        "id": id,
        "user_id": value["user_id"],
        "content": value["content"],
        "created_at": "2024-01-01T00:00:00Z"
    }));
    StatusCode::CREATED.into_response()
}

async fn update_note(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    record(&state, method, &uri, &headers, &body);
    let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    if let Some(id) = id_filter(&query) {
        for note in lock(&state).notes.iter_mut() {
            if note_id_string(note) == id {
                note["content"] = value["content"].clone();
            }
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_note(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    record(&state, method, &uri, &headers, "");
    if let Some(id) = id_filter(&query) {
        lock(&state).notes.retain(|note| note_id_string(note) != id);
    }
    StatusCode::NO_CONTENT.into_response()
}

/// In-process stand-in for the Supabase auth + PostgREST endpoints.
pub struct FakeSupabase {
    pub base_url: String,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeSupabase {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));
        let router = Router::new()
            .route("/auth/v1/user", get(get_user))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/logout", post(logout))
            .route(
                "/rest/v1/notes",
                get(list_notes)
                    .post(add_note)
                    .patch(update_note)
                    .delete(delete_note),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake supabase");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        }
    }

    pub fn settings(&self) -> AppSettings {
        AppSettings {
            supabase_url: self.base_url.clone(),
            supabase_anon_key: "anon-key".to_string(),
            ..AppSettings::default()
        }
    }

    pub fn project(&self) -> SupabaseProject {
        SupabaseProject::new(&self.base_url, "anon-key", Duration::from_secs(5)).expect("project")
    }

    pub fn accept_token(&self, access_token: &str) {
        lock(&self.state)
            .accepted_tokens
            .insert(access_token.to_string());
    }

    pub fn allow_refresh(&self, refresh_token: &str, new_access: &str, new_refresh: &str) {
        lock(&self.state).refresh_grants.insert(
            refresh_token.to_string(),
            (new_access.to_string(), new_refresh.to_string()),
        );
    }

    pub fn set_logout_status(&self, status: u16) {
        lock(&self.state).logout_status = Some(StatusCode::from_u16(status).expect("status"));
    }

    pub fn seed_note(&self, id: Value, content: &str) {
        lock(&self.state).notes.push(json!({
            "id": id,
            "user_id": USER_ID,
            "content": content
        }));
    }

    pub fn notes(&self) -> Vec<Value> {
        lock(&self.state).notes.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for FakeSupabase {
    fn drop(&mut self) {
        self.server.abort();
    }
}
