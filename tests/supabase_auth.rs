mod support;

use quicknotes_lib::auth::identity::IdentityBackend;
use quicknotes_lib::auth::session::Session;
use quicknotes_lib::auth::supabase::SupabaseAuth;
use quicknotes_lib::shared::error::codes;

#[tokio::test]
async fn set_session_installs_valid_pair() {
    let fake = support::FakeSupabase::start().await;
    fake.accept_token("access-1");
    let auth = SupabaseAuth::new(fake.project());

    let installed = auth
        .set_session(&Session::new("access-1", "refresh-1").unwrap())
        .await
        .expect("set session");

    assert_eq!(installed.user.id, support::USER_ID);
    assert_eq!(installed.user.email.as_deref(), Some(support::USER_EMAIL));
    assert_eq!(installed.session.access_token(), "access-1");
    assert_eq!(auth.access_token().as_deref(), Some("access-1"));

    let user_requests = fake.requests_to("/auth/v1/user");
    assert_eq!(user_requests.len(), 1);
    assert_eq!(user_requests[0].apikey.as_deref(), Some("anon-key"));
    assert_eq!(user_requests[0].authorization.as_deref(), Some("Bearer access-1"));
}

#[tokio::test]
async fn expired_access_token_is_refreshed_once() {
    let fake = support::FakeSupabase::start().await;
    fake.allow_refresh("refresh-1", "access-2", "refresh-2");
    let auth = SupabaseAuth::new(fake.project());

    let installed = auth
        .set_session(&Session::new("expired", "refresh-1").unwrap())
        .await
        .expect("set session");

    assert_eq!(installed.session, Session::new("access-2", "refresh-2").unwrap());
    assert_eq!(auth.access_token().as_deref(), Some("access-2"));

    let token_requests = fake.requests_to("/auth/v1/token");
    assert_eq!(token_requests.len(), 1);
    assert_eq!(token_requests[0].query, "grant_type=refresh_token");
    assert!(token_requests[0].body.contains("refresh-1"));
}

#[tokio::test]
async fn rejected_pair_is_session_rejected_without_leaking_tokens() {
    let fake = support::FakeSupabase::start().await;
    let auth = SupabaseAuth::new(fake.project());

    let err = auth
        .set_session(&Session::new("expired-access-token", "revoked-refresh-token").unwrap())
        .await
        .expect_err("should fail");

    assert!(err.is(codes::SESSION_REJECTED));
    assert!(err.message().contains("invalid_grant"), "{err}");
    assert!(!err.to_string().contains("revoked-refresh-token"));
    assert!(auth.access_token().is_none());
}

#[tokio::test]
async fn get_user_reflects_active_session() {
    let fake = support::FakeSupabase::start().await;
    fake.accept_token("access-1");
    let auth = SupabaseAuth::new(fake.project());

    assert_eq!(auth.get_user().await.unwrap(), None);
    auth.set_session(&Session::new("access-1", "refresh-1").unwrap())
        .await
        .unwrap();
    let user = auth.get_user().await.unwrap().expect("user");
    assert_eq!(user.id, support::USER_ID);
}

#[tokio::test]
async fn sign_out_calls_logout_and_drops_session() {
    let fake = support::FakeSupabase::start().await;
    fake.accept_token("access-1");
    let auth = SupabaseAuth::new(fake.project());
    auth.set_session(&Session::new("access-1", "refresh-1").unwrap())
        .await
        .unwrap();

    auth.sign_out().await.expect("sign out");

    let logout = fake.requests_to("/auth/v1/logout");
    assert_eq!(logout.len(), 1);
    assert_eq!(logout[0].authorization.as_deref(), Some("Bearer access-1"));
    assert!(auth.access_token().is_none());
}

#[tokio::test]
async fn failed_remote_logout_still_drops_local_session() {
    let fake = support::FakeSupabase::start().await;
    fake.accept_token("access-1");
    fake.set_logout_status(500);
    let auth = SupabaseAuth::new(fake.project());
    auth.set_session(&Session::new("access-1", "refresh-1").unwrap())
        .await
        .unwrap();

    let err = auth.sign_out().await.expect_err("remote failure surfaces");

    assert!(err.is(codes::BACKEND_ERROR));
    assert!(err.message().contains("status=500"));
    assert!(auth.access_token().is_none());
}

#[tokio::test]
async fn already_revoked_session_counts_as_signed_out() {
    let fake = support::FakeSupabase::start().await;
    fake.accept_token("access-1");
    fake.set_logout_status(401);
    let auth = SupabaseAuth::new(fake.project());
    auth.set_session(&Session::new("access-1", "refresh-1").unwrap())
        .await
        .unwrap();

    auth.sign_out().await.expect("401 is fine");
}
