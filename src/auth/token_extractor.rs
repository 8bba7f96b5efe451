//! Usage: Extract the access/refresh token pair from an OAuth redirect URL.
//!
//! Implicit-flow responses normally carry the tokens in the fragment
//! (`#access_token=...`); some provider/redirect setups put them in the query
//! instead. The fragment wins whenever it holds anything past the `#`.

use crate::auth::session::Session;
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::redact_url_tokens;
use std::borrow::Cow;
use url::{form_urlencoded, Url};

#[derive(Debug, Default)]
struct CallbackParams {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn collect_params<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> CallbackParams {
    let mut params = CallbackParams::default();
    for (key, value) in pairs {
        let slot = match key.as_ref() {
            "access_token" => &mut params.access_token,
            "refresh_token" => &mut params.refresh_token,
            "error" => &mut params.error,
            "error_description" => &mut params.error_description,
            _ => continue,
        };
        // Repeated keys: the first occurrence wins.
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    params
}

fn select_params(url: &Url) -> (CallbackParams, &'static str) {
    match url.fragment().filter(|fragment| !fragment.is_empty()) {
        Some(fragment) => (
            collect_params(form_urlencoded::parse(fragment.as_bytes())),
            "fragment",
        ),
        None => (collect_params(url.query_pairs()), "query"),
    }
}

/// Tokens carried by `redirect_url`, or `MISSING_TOKENS`.
pub fn extract_session(redirect_url: &str) -> AppResult<Session> {
    let url = Url::parse(redirect_url.trim()).map_err(|e| {
        AppError::new(
            codes::MISSING_TOKENS,
            format!("callback url is not a valid url: {e}"),
        )
    })?;

    let (params, source) = select_params(&url);
    let session = match (params.access_token, params.refresh_token) {
        (Some(access_token), Some(refresh_token)) => Session::new(access_token, refresh_token),
        _ => None,
    };

    match session {
        Some(session) => {
            tracing::debug!(source, "extracted session tokens from callback url");
            Ok(session)
        }
        None => {
            tracing::warn!(
                source,
                callback = %redact_url_tokens(redirect_url),
                "callback url is missing access_token/refresh_token"
            );
            let mut message = format!("callback url {source} lacks access_token/refresh_token");
            if let Some(error) = params.error {
                message.push_str(" (provider error: ");
                message.push_str(error.as_str());
                if let Some(description) = params.error_description {
                    message.push_str(" - ");
                    message.push_str(description.chars().take(240).collect::<String>().as_str());
                }
                message.push(')');
            }
            Err(AppError::new(codes::MISSING_TOKENS, message))
        }
    }
}
