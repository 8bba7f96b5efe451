//! Usage: Unified error model (every failure carries a `CODE: message` pair).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

/// Stable error codes surfaced to the presentation boundary.
pub mod codes {
    /// The OAuth callback URL lacked `access_token` or `refresh_token`.
    pub const MISSING_TOKENS: &str = "MISSING_TOKENS";
    /// The interactive flow ended without producing a callback URL.
    pub const OAUTH_ABORTED: &str = "OAUTH_ABORTED";
    /// The identity backend answered with an error payload.
    pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
    /// The identity backend refused the token pair (expired or revoked refresh token).
    pub const SESSION_REJECTED: &str = "SESSION_REJECTED";
    /// A notes table operation answered with an error payload.
    pub const REPOSITORY_ERROR: &str = "REPOSITORY_ERROR";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new(codes::INTERNAL_ERROR, value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}
