//! Usage: Shared HTTP plumbing for the Supabase project (client, endpoints, error payloads).

use crate::infra::settings::AppSettings;
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::sanitize_body_snippet;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("quicknotes/", env!("CARGO_PKG_VERSION"));

/// Base URL + anon key of a Supabase project, with a configured HTTP client.
#[derive(Debug, Clone)]
pub struct SupabaseProject {
    base_url: Url,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseProject {
    pub fn new(base_url: &str, anon_key: &str, request_timeout: Duration) -> AppResult<Self> {
        let mut base_url = Url::parse(base_url.trim()).map_err(|e| {
            AppError::new(codes::CONFIG_ERROR, format!("invalid supabase url: {e}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let anon_key = anon_key.trim();
        if anon_key.is_empty() {
            return Err(AppError::new(codes::CONFIG_ERROR, "supabase anon key is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: failed to build http client: {e}"))?;

        Ok(Self {
            base_url,
            anon_key: anon_key.to_string(),
            client,
        })
    }

    pub fn from_settings(settings: &AppSettings) -> AppResult<Self> {
        settings.require_backend()?;
        Self::new(
            &settings.supabase_url,
            &settings.supabase_anon_key,
            Duration::from_secs(u64::from(settings.request_timeout_seconds)),
        )
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `path` is relative to the project root, e.g. `auth/v1/user`.
    pub fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::new(codes::CONFIG_ERROR, format!("invalid endpoint {path}: {e}")))
    }

    /// `apikey` plus a bearer token (the anon key when no user token is given).
    pub fn headers(&self, bearer: Option<&str>) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| AppError::new(codes::CONFIG_ERROR, "anon key is not a valid header"))?;
        headers.insert("apikey", apikey);

        let token = bearer.unwrap_or(&self.anon_key);
        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AppError::new(codes::INVALID_INPUT, "token is not a valid header"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        Ok(headers)
    }
}

/// Pull a short `(code, message)` pair out of a GoTrue/PostgREST error body.
pub(crate) fn parse_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let code = text("error_code")
        .or_else(|| text("code"))
        .or_else(|| text("error"))
        .or_else(|| value.get("code").and_then(Value::as_i64).map(|c| c.to_string()));
    let message = text("msg")
        .or_else(|| text("message"))
        .or_else(|| text("error_description"))
        .map(|msg| match text("details") {
            Some(details) => format!("{msg} ({details})"),
            None => msg,
        });

    (code, message)
}

/// Build an error with `code` from a non-success response.
pub(crate) async fn error_from_response(
    code: &'static str,
    operation: &str,
    response: reqwest::Response,
) -> AppError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return AppError::new(
                code,
                format!("{operation} returned status={} (body unreadable: {e})", status.as_u16()),
            )
        }
    };
    error_from_body(code, operation, status.as_u16(), &body)
}

pub(crate) fn error_from_body(code: &'static str, operation: &str, status: u16, body: &str) -> AppError {
    let (error_code, error_message) = parse_error_details(body);
    let mut msg = format!("{operation} returned status={status}");
    if let Some(error_code) = error_code {
        msg.push_str(" code=");
        msg.push_str(error_code.as_str());
    }
    if let Some(detail) = error_message {
        msg.push_str(" message=");
        msg.push_str(detail.chars().take(240).collect::<String>().as_str());
    } else if !body.trim().is_empty() {
        msg.push_str(" body=");
        msg.push_str(sanitize_body_snippet(body).as_str());
    }
    AppError::new(code, msg)
}
