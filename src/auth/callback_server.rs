//! Usage: One-shot localhost listener that captures the OAuth redirect.
//!
//! Browsers never send the URL fragment to a server, so a first hit without
//! tokens gets a relay page that re-requests the same path with the fragment
//! folded into the query (`relayed=1`). That second request is the capture.

use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::{constant_time_eq, redact_url_tokens};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

const SUCCESS_HTML: &str =
    "<html><body><h1>Signed in</h1><p>You may close this window and return to Quick Notes.</p></body></html>";
const ERROR_HTML: &str =
    "<html><body><h1>Sign-in failed</h1><p>You may close this window and retry.</p></body></html>";
const RELAY_HTML: &str = r#"<html><body><p>Completing sign-in...</p><script>
(function () {
  var parts = [];
  if (location.search.length > 1) parts.push(location.search.substring(1));
  if (location.hash.length > 1) parts.push(location.hash.substring(1));
  parts.push("relayed=1");
  location.replace(location.pathname + "?" + parts.join("&"));
})();
</script></body></html>"#;
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";

pub(crate) const STATE_PARAM: &str = "state";
const RELAY_MARKER: &str = "relayed";
const MAX_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug)]
pub(crate) struct BoundCallbackListener {
    port: u16,
    callback_path: String,
    state: String,
    listener_v4: TcpListener,
    listener_v6: Option<TcpListener>,
}

impl BoundCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URL to register with the provider, including the state nonce.
    pub(crate) fn redirect_url(&self) -> String {
        format!(
            "http://127.0.0.1:{}{}?{STATE_PARAM}={}",
            self.port, self.callback_path, self.state
        )
    }
}

/// Random URL-safe nonce tying the callback to this listener.
pub(crate) fn generate_state() -> String {
    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

pub(crate) async fn bind_callback_listener(
    preferred_port: u16,
    callback_path: &str,
) -> AppResult<BoundCallbackListener> {
    let (port, listener_v4, listener_v6) = match try_bind_on_port(preferred_port).await {
        Ok(bound) => bound,
        Err(preferred_err) if preferred_port == 0 => {
            return Err(AppError::new(
                codes::SYSTEM_ERROR,
                format!("oauth callback bind failed: {preferred_err}"),
            ))
        }
        Err(preferred_err) => match try_bind_on_port(0).await {
            Ok(bound) => {
                tracing::warn!(
                    preferred_port,
                    port = bound.0,
                    "preferred oauth callback port unavailable; using a dynamic port: {}",
                    preferred_err
                );
                bound
            }
            Err(fallback_err) => {
                return Err(AppError::new(
                    codes::SYSTEM_ERROR,
                    format!(
                        "oauth callback bind failed: {preferred_err}; fallback_dynamic_port: {fallback_err}"
                    ),
                ))
            }
        },
    };

    Ok(BoundCallbackListener {
        port,
        callback_path: callback_path.to_string(),
        state: generate_state(),
        listener_v4,
        listener_v6,
    })
}

type BoundPair = (u16, TcpListener, Option<TcpListener>);

async fn try_bind_on_port(port: u16) -> Result<BoundPair, String> {
    if port == 0 {
        return try_bind_dynamic_port().await;
    }

    let mut bind_errors: Vec<String> = Vec::new();
    let listener_v4 = TcpListener::bind(("127.0.0.1", port)).await;
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("::1:{port} ({err})"));
            None
        }
    };
    // The redirect URL names 127.0.0.1, so the v4 socket is mandatory.
    match listener_v4 {
        Ok(listener_v4) => Ok((port, listener_v4, listener_v6)),
        Err(err) => {
            bind_errors.insert(0, format!("127.0.0.1:{port} ({err})"));
            Err(bind_errors.join("; "))
        }
    }
}

async fn try_bind_dynamic_port() -> Result<BoundPair, String> {
    let listener_v4 = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|err| format!("127.0.0.1:0 ({err})"))?;
    let port = listener_v4
        .local_addr()
        .map_err(|e| format!("127.0.0.1:0 (local_addr failed: {e})"))?
        .port();
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            tracing::debug!(port, "ipv6 loopback unavailable for oauth callback: {}", err);
            None
        }
    };
    Ok((port, listener_v4, listener_v6))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackRequest {
    /// Not ours (favicon, wrong path).
    Ignored,
    /// Tokens may still sit in the fragment; answer with the relay page.
    NeedsRelay,
    /// Final redirect; carries the reconstructed callback URL.
    Complete { url: String, state: Option<String> },
}

/// Classify a request target (`/path?query`) received on `port`.
pub(crate) fn classify_request_target(
    target: &str,
    port: u16,
    callback_path: &str,
) -> AppResult<CallbackRequest> {
    let full = format!("http://127.0.0.1:{port}{target}");
    let url = Url::parse(&full)
        .map_err(|e| AppError::new(codes::SYSTEM_ERROR, format!("invalid oauth callback target: {e}")))?;

    if url.path() != callback_path {
        return Ok(CallbackRequest::Ignored);
    }

    let mut state: Option<String> = None;
    let mut final_hop = false;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            STATE_PARAM if state.is_none() => state = Some(value.into_owned()),
            RELAY_MARKER | "access_token" | "refresh_token" | "error" => final_hop = true,
            _ => {}
        }
    }

    if !final_hop {
        return Ok(CallbackRequest::NeedsRelay);
    }
    Ok(CallbackRequest::Complete { url: full, state })
}

pub(crate) fn validate_state(actual: Option<&str>, expected_state: &str) -> AppResult<()> {
    let state = actual
        .ok_or_else(|| AppError::new(codes::INVALID_INPUT, "oauth callback missing state"))?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err(AppError::new(
            codes::INVALID_INPUT,
            "oauth callback state mismatch",
        ));
    }
    Ok(())
}

/// Serve the callback path until the redirect arrives.
///
/// `Ok(None)` when `timeout` elapses first; a `None` timeout waits indefinitely.
pub(crate) async fn wait_for_callback(
    listener: BoundCallbackListener,
    timeout: Option<Duration>,
) -> AppResult<Option<String>> {
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

    loop {
        let accept_future = async {
            match listener.listener_v6.as_ref() {
                Some(v6) => {
                    tokio::select! {
                        result = listener.listener_v4.accept() => result,
                        result = v6.accept() => result,
                    }
                }
                None => listener.listener_v4.accept().await,
            }
        };

        let accepted = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, accept_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::info!(port = listener.port, "oauth callback wait timed out");
                    return Ok(None);
                }
            },
            None => accept_future.await,
        };

        let (mut socket, _) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("oauth callback accept failed: {}", e);
                continue;
            }
        };

        let target = match read_request_target(&mut socket).await {
            Ok(target) => target,
            Err(err) => {
                tracing::debug!("ignoring malformed oauth callback request: {}", err);
                let _ = write_response(&mut socket, "400 Bad Request", ERROR_HTML).await;
                continue;
            }
        };

        match classify_request_target(&target, listener.port, &listener.callback_path)? {
            CallbackRequest::Ignored => {
                let _ = write_response(&mut socket, "404 Not Found", NOT_FOUND_HTML).await;
            }
            CallbackRequest::NeedsRelay => {
                tracing::debug!("serving oauth relay page");
                let _ = write_response(&mut socket, "200 OK", RELAY_HTML).await;
            }
            CallbackRequest::Complete { url, state } => {
                if let Err(err) = validate_state(state.as_deref(), &listener.state) {
                    let _ = write_response(&mut socket, "400 Bad Request", ERROR_HTML).await;
                    return Err(err);
                }
                let has_tokens = url.contains("access_token=");
                let (status, body) = if has_tokens {
                    ("200 OK", SUCCESS_HTML)
                } else {
                    ("400 Bad Request", ERROR_HTML)
                };
                let _ = write_response(&mut socket, status, body).await;
                tracing::info!(callback = %redact_url_tokens(&url), "oauth callback captured");
                return Ok(Some(url));
            }
        }
    }
}

async fn read_request_target(socket: &mut TcpStream) -> AppResult<String> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| AppError::new(codes::SYSTEM_ERROR, format!("oauth callback read failed: {e}")))?;
    if size == 0 {
        return Err(AppError::new(codes::SYSTEM_ERROR, "oauth callback request is empty"));
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    extract_request_target(request.as_ref()).map(str::to_string)
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let first = request
        .lines()
        .next()
        .ok_or_else(|| AppError::new(codes::SYSTEM_ERROR, "oauth callback malformed request"))?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || !target.starts_with('/') {
        return Err(AppError::new(codes::SYSTEM_ERROR, "oauth callback must be GET"));
    }
    Ok(target)
}

async fn write_response(socket: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nCache-Control: no-store\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/auth/callback";

    #[test]
    fn first_hop_without_tokens_needs_relay() {
        let req = classify_request_target("/auth/callback?state=s1", 53682, PATH).unwrap();
        assert_eq!(req, CallbackRequest::NeedsRelay);
    }

    #[test]
    fn relayed_hop_is_complete() {
        let req = classify_request_target(
            "/auth/callback?state=s1&access_token=abc&refresh_token=xyz&relayed=1",
            53682,
            PATH,
        )
        .unwrap();
        assert_eq!(
            req,
            CallbackRequest::Complete {
                url: "http://127.0.0.1:53682/auth/callback?state=s1&access_token=abc&refresh_token=xyz&relayed=1".to_string(),
                state: Some("s1".to_string()),
            }
        );
    }

    #[test]
    fn query_tokens_complete_without_relay() {
        let req = classify_request_target(
            "/auth/callback?access_token=abc&refresh_token=xyz&state=s1",
            53682,
            PATH,
        )
        .unwrap();
        assert!(matches!(req, CallbackRequest::Complete { .. }));
    }

    #[test]
    fn provider_error_in_query_is_complete() {
        let req =
            classify_request_target("/auth/callback?error=access_denied&state=s1", 1, PATH).unwrap();
        assert!(matches!(req, CallbackRequest::Complete { .. }));
    }

    #[test]
    fn other_paths_are_ignored() {
        assert_eq!(
            classify_request_target("/favicon.ico", 1, PATH).unwrap(),
            CallbackRequest::Ignored
        );
    }

    #[test]
    fn validate_state_rejects_mismatch_and_missing() {
        assert!(validate_state(Some("foo"), "foo").is_ok());
        let err = validate_state(Some("foo"), "bar").expect_err("should fail");
        assert!(err.to_string().contains("state mismatch"));
        assert!(validate_state(None, "bar").unwrap_err().is(codes::INVALID_INPUT));
    }

    #[test]
    fn extract_request_target_requires_get() {
        assert_eq!(
            extract_request_target("GET /auth/callback?x=1 HTTP/1.1\r\nHost: a\r\n\r\n").unwrap(),
            "/auth/callback?x=1"
        );
        assert!(extract_request_target("POST /auth/callback HTTP/1.1\r\n").is_err());
    }

    #[test]
    fn generated_state_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(state, generate_state());
    }

    #[tokio::test]
    async fn wait_for_callback_times_out_as_abandoned() {
        let listener = bind_callback_listener(0, PATH).await.expect("bind");
        let result = wait_for_callback(listener, Some(Duration::from_millis(50)))
            .await
            .expect("wait");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn wait_for_callback_relays_then_captures() {
        let listener = bind_callback_listener(0, PATH).await.expect("bind");
        let port = listener.port();
        let redirect = listener.redirect_url();
        let state = redirect.split("state=").nth(1).unwrap().to_string();

        let waiter = tokio::spawn(wait_for_callback(listener, Some(Duration::from_secs(10))));

        let first = raw_get(port, &format!("{PATH}?state={state}")).await;
        assert!(first.contains("relayed=1"));

        let second = raw_get(
            port,
            &format!("{PATH}?state={state}&access_token=abc&refresh_token=xyz&relayed=1"),
        )
        .await;
        assert!(second.starts_with("HTTP/1.1 200 OK"));

        let captured = waiter.await.expect("join").expect("wait").expect("url");
        assert!(captured.contains("access_token=abc"));
        assert!(captured.starts_with(&format!("http://127.0.0.1:{port}{PATH}?")));
    }

    #[tokio::test]
    async fn wait_for_callback_rejects_foreign_state() {
        let listener = bind_callback_listener(0, PATH).await.expect("bind");
        let port = listener.port();
        let waiter = tokio::spawn(wait_for_callback(listener, Some(Duration::from_secs(10))));

        let _ = raw_get(port, &format!("{PATH}?state=forged&access_token=a&refresh_token=b")).await;

        let err = waiter.await.expect("join").expect_err("should fail");
        assert!(err.is(codes::INVALID_INPUT));
    }

    async fn raw_get(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n").as_bytes())
            .await
            .expect("write");
        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");
        response
    }
}
