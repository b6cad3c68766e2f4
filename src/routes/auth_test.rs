use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use super::*;
use crate::backend::AuthSubscription;
use crate::backend::memory::{MemoryBackend, test_session};
use crate::model::{AuthEvent, OAuthProvider, Session};
use crate::routes::router;

fn user() -> UserId {
    UserId(Uuid::from_u128(5))
}

async fn get<A: AuthBackend + 'static>(
    auth: A,
    uri: &str,
) -> (axum::response::Response, mpsc::UnboundedReceiver<CallbackOutcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let response = router(Arc::new(auth), tx)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    (response, rx)
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Auth backend whose code exchange fails below the provider.
struct UnreachableAuth;

#[async_trait]
impl AuthBackend for UnreachableAuth {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(None)
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        MemoryBackend::new().on_auth_state_change()
    }

    async fn sign_in_with_oauth(&self, _: OAuthProvider, _: &str) -> Result<String, BackendError> {
        Err(BackendError::Request("connection refused".into()))
    }

    async fn exchange_code_for_session(&self, _: &str) -> Result<Session, BackendError> {
        Err(BackendError::Request("connection refused".into()))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

// =============================================================================
// CallbackError
// =============================================================================

#[test]
fn error_codes_match_login_page_contract() {
    assert_eq!(CallbackError::NoAuthCode.error_code(), "no_code");
    assert_eq!(CallbackError::SessionExchangeFailed("x".into()).error_code(), "login_failed");
    assert_eq!(CallbackError::ServerError("x".into()).error_code(), "server_error");
}

#[test]
fn login_redirect_encodes_exchange_message() {
    let err = CallbackError::SessionExchangeFailed("invalid grant & expired".into());
    assert_eq!(err.login_redirect(), "/auth?error=login_failed&message=invalid+grant+%26+expired");
}

#[test]
fn server_error_redirect_omits_details() {
    let err = CallbackError::ServerError("db password in here".into());
    assert_eq!(err.login_redirect(), "/auth?error=server_error");
}

#[test]
fn describe_login_error_covers_every_code() {
    assert_eq!(describe_login_error("no_code", None), "Login failed: no authorization code was returned.");
    assert_eq!(describe_login_error("login_failed", Some("bad code")), "Login failed: bad code");
    assert_eq!(describe_login_error("login_failed", Some("  ")), "Login failed.");
    assert_eq!(
        describe_login_error("server_error", Some("ignored")),
        "Login failed: server error. Please try again."
    );
    assert_eq!(describe_login_error("weird", None), "Login failed: weird");
}

#[test]
fn escape_html_neutralizes_markup() {
    assert_eq!(escape_html(r#"<b a="1">'x'&</b>"#), "&lt;b a=&quot;1&quot;&gt;&#39;x&#39;&amp;&lt;/b&gt;");
}

// =============================================================================
// GET /auth/callback
// =============================================================================

#[tokio::test]
async fn callback_without_code_redirects_no_code() {
    let (response, mut rx) = get(MemoryBackend::new(), "/auth/callback").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/auth?error=no_code");
    assert_eq!(rx.recv().await, Some(Err(CallbackError::NoAuthCode)));
}

#[tokio::test]
async fn callback_with_empty_code_counts_as_missing() {
    let (response, _rx) = get(MemoryBackend::new(), "/auth/callback?code=").await;
    assert_eq!(location(&response), "/auth?error=no_code");
}

#[tokio::test]
async fn callback_with_provider_denial_redirects_no_code() {
    let (response, _rx) = get(
        MemoryBackend::new(),
        "/auth/callback?error=access_denied&error_description=user+cancelled",
    )
    .await;
    assert_eq!(location(&response), "/auth?error=no_code");
}

#[tokio::test]
async fn callback_with_valid_code_signs_in_and_redirects_home() {
    let backend = MemoryBackend::new();
    backend.accept_code("good", user());
    let mut listener = backend.on_auth_state_change();

    let (response, mut rx) = get(backend.clone(), "/auth/callback?code=good").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/");
    assert_eq!(rx.recv().await, Some(Ok(user())));
    let change = listener.recv().await.unwrap();
    assert_eq!(change.event, AuthEvent::SignedIn);
    assert_eq!(change.session, Some(test_session(user())));
}

#[tokio::test]
async fn callback_with_rejected_code_redirects_login_failed() {
    let (response, mut rx) = get(MemoryBackend::new(), "/auth/callback?code=stale").await;

    assert_eq!(
        location(&response),
        "/auth?error=login_failed&message=invalid+flow+state%2C+no+valid+flow+state+found"
    );
    let outcome = rx.recv().await.unwrap();
    assert!(matches!(outcome, Err(CallbackError::SessionExchangeFailed(_))));
}

#[tokio::test]
async fn callback_transport_failure_redirects_server_error() {
    let (response, mut rx) = get(UnreachableAuth, "/auth/callback?code=abc").await;

    assert_eq!(location(&response), "/auth?error=server_error");
    let outcome = rx.recv().await.unwrap();
    assert!(matches!(outcome, Err(CallbackError::ServerError(m)) if m.contains("connection refused")));
}

#[tokio::test]
async fn callback_still_redirects_when_app_loop_is_gone() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let response = router(Arc::new(MemoryBackend::new()), tx)
        .oneshot(Request::builder().uri("/auth/callback").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(location(&response), "/auth?error=no_code");
}

// =============================================================================
// pages
// =============================================================================

#[tokio::test]
async fn login_page_renders_escaped_error_line() {
    let (response, _rx) = get(MemoryBackend::new(), "/auth?error=login_failed&message=%3Cscript%3E").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Smart Bookmark App"));
    assert!(body.contains("Login failed: &lt;script&gt;"));
    assert!(!body.contains("<script>"));
}

#[tokio::test]
async fn login_page_without_error_has_no_error_line() {
    let (response, _rx) = get(MemoryBackend::new(), "/auth").await;
    let body = body_text(response).await;
    assert!(!body.contains("class=\"error\""));
}

#[tokio::test]
async fn home_page_confirms_sign_in() {
    let (response, _rx) = get(MemoryBackend::new(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("You are signed in"));
}

#[tokio::test]
async fn healthz_is_ok() {
    let (response, _rx) = get(MemoryBackend::new(), "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
}
