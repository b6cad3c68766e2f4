//! OAuth callback routes: code exchange, login-result page, signed-in page.
//!
//! The browser lands on `/auth/callback` after the provider's consent screen.
//! Every outcome is redirected to a page the browser can show and also sent
//! to the terminal app over the outcome channel.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::CallbackState;
use crate::backend::{AuthBackend, BackendError};
use crate::model::UserId;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("no authorization code in callback")]
    NoAuthCode,

    #[error("session exchange failed: {0}")]
    SessionExchangeFailed(String),

    #[error("callback handling failed: {0}")]
    ServerError(String),
}

impl CallbackError {
    /// Code carried in the `error` query parameter of the login page.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoAuthCode => "no_code",
            Self::SessionExchangeFailed(_) => "login_failed",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Login page location describing this error. Only the provider's
    /// rejection message is forwarded; server errors stay in the log.
    #[must_use]
    pub fn login_redirect(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("error", self.error_code());
        if let Self::SessionExchangeFailed(message) = self {
            query.append_pair("message", message);
        }
        format!("/auth?{}", query.finish())
    }

    /// Line shown on the login screen.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionExchangeFailed(message) => describe_login_error(self.error_code(), Some(message)),
            _ => describe_login_error(self.error_code(), None),
        }
    }
}

/// Result of one callback request, as delivered to the app loop.
pub type CallbackOutcome = Result<UserId, CallbackError>;

/// Human-readable line for a login error code and optional message.
#[must_use]
pub fn describe_login_error(code: &str, message: Option<&str>) -> String {
    let message = message.map(str::trim).filter(|m| !m.is_empty());
    match (code, message) {
        ("no_code", _) => "Login failed: no authorization code was returned.".to_owned(),
        ("login_failed", Some(message)) => format!("Login failed: {message}"),
        ("login_failed", None) => "Login failed.".to_owned(),
        ("server_error", _) => "Login failed: server error. Please try again.".to_owned(),
        (other, _) => format!("Login failed: {other}"),
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /auth/callback`: exchange the code, redirect to `/` or the login page.
pub async fn callback<A: AuthBackend + 'static>(
    State(state): State<CallbackState<A>>,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let outcome = match params.code.as_deref().filter(|code| !code.is_empty()) {
        None => {
            warn!(
                provider_error = params.error.as_deref().unwrap_or(""),
                provider_error_description = params.error_description.as_deref().unwrap_or(""),
                "no code provided in callback"
            );
            Err(CallbackError::NoAuthCode)
        }
        Some(code) => exchange(state.auth.as_ref(), code).await,
    };

    let location = match &outcome {
        Ok(_) => "/".to_owned(),
        Err(e) => e.login_redirect(),
    };
    if state.outcomes.send(outcome).is_err() {
        warn!("callback outcome dropped; app loop is gone");
    }
    Redirect::temporary(&location).into_response()
}

async fn exchange<A: AuthBackend>(auth: &A, code: &str) -> CallbackOutcome {
    match auth.exchange_code_for_session(code).await {
        Ok(session) => {
            info!(user_id = %session.user_id(), "session created");
            Ok(session.user_id())
        }
        Err(BackendError::SessionExchangeFailed(message)) => {
            error!(error = %message, "session exchange failed");
            Err(CallbackError::SessionExchangeFailed(message))
        }
        Err(e) => {
            error!(error = %e, "callback handler error");
            Err(CallbackError::ServerError(e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
    message: Option<String>,
}

/// `GET /auth`: login-result page; shows the error line when there is one.
pub async fn login_page(Query(params): Query<LoginQuery>) -> Html<String> {
    let body = match params.error.as_deref() {
        Some(code) => format!(
            r#"<p class="error">{}</p><p>Return to your terminal and run <code>login</code> to try again.</p>"#,
            escape_html(&describe_login_error(code, params.message.as_deref()))
        ),
        None => "<p>Return to your terminal and run <code>login</code> to sign in.</p>".to_owned(),
    };
    page(&body)
}

/// `GET /`: shown after a successful sign-in.
pub async fn home() -> Html<String> {
    page("<p>You are signed in. Return to your terminal.</p>")
}

fn page(body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Smart Bookmark App</title></head>\
         <body><h1>Smart Bookmark App</h1>{body}</body></html>"
    ))
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
