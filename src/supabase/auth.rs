//! GoTrue auth: PKCE sign-in, code exchange, refresh and logout.
//!
//! The sign-in request only builds the authorize URL; the verifier stays in
//! memory until the callback's code is exchanged for a session.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{SupabaseClient, lock, parse_error_body};
use crate::backend::{AuthBackend, AuthSubscription, BackendError};
use crate::model::{AuthEvent, OAuthProvider, Session, SessionUser};

const VERIFIER_BYTES: usize = 32;

// =============================================================================
// PKCE
// =============================================================================

/// Random code verifier, 43 URL-safe characters.
pub(crate) fn generate_verifier() -> String {
    let bytes: [u8; VERIFIER_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for a verifier.
pub(crate) fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Provider authorize URL carrying the redirect target and PKCE challenge.
pub(crate) fn authorize_url(
    base_url: &str,
    provider: OAuthProvider,
    redirect_to: &str,
    challenge: &str,
) -> Result<String, BackendError> {
    let mut url = reqwest::Url::parse(&format!("{base_url}/auth/v1/authorize"))
        .map_err(|e| BackendError::Request(format!("authorize url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("provider", provider.as_str())
        .append_pair("redirect_to", redirect_to)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url.into())
}

// =============================================================================
// TOKEN RESPONSE
// =============================================================================

#[derive(Debug, serde::Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SessionUser,
}

impl TokenResponse {
    /// Prefer the absolute expiry; derive one from `expires_in` otherwise.
    pub(crate) fn into_session(self, now_unix: i64) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at.or(self.expires_in.map(|secs| now_unix + secs)),
            user: self.user,
        }
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl SupabaseClient {
    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.endpoint(&format!("/auth/v1/token?grant_type={grant_type}")))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            let (message, _) = parse_error_body(status, &text);
            return Err(BackendError::SessionExchangeFailed(message));
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))?;
        Ok(token.into_session(now_unix()))
    }

    /// Access token of a session that is not about to expire.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when signed out, or the refresh failure.
    pub(crate) async fn valid_access_token(&self) -> Result<String, BackendError> {
        self.get_session()
            .await?
            .map(|session| session.access_token)
            .ok_or(BackendError::NotAuthenticated)
    }
}

// =============================================================================
// AUTH BACKEND
// =============================================================================

#[async_trait]
impl AuthBackend for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        match self.current_session() {
            Some(session) if session.expires_within(now_unix(), self.refresh_margin_secs) => {}
            current => return Ok(current),
        }

        // Refresh tokens are single-use: callers queued behind a refresh
        // take the session it stored instead of sending their own.
        let _refreshing = self.refresh_lock.lock().await;
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.expires_within(now_unix(), self.refresh_margin_secs) {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user_id(), "session near expiry; refreshing");
        let body = serde_json::json!({ "refresh_token": session.refresh_token });
        match self.token_request("refresh_token", body).await {
            Ok(fresh) => {
                self.set_session(Some(fresh.clone()), AuthEvent::TokenRefreshed);
                Ok(Some(fresh))
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed; signing out");
                self.set_session(None, AuthEvent::SignedOut);
                Err(e)
            }
        }
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.register_listener()
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError> {
        let verifier = generate_verifier();
        let url = authorize_url(&self.base_url, provider, redirect_to, &challenge_for(&verifier))?;
        *lock(&self.pkce_verifier) = Some(verifier);
        info!(provider = %provider, redirect_to, "oauth sign-in started");
        Ok(url)
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError> {
        let verifier = lock(&self.pkce_verifier)
            .take()
            .ok_or_else(|| BackendError::SessionExchangeFailed("no sign-in in progress".into()))?;

        let body = serde_json::json!({ "auth_code": code, "code_verifier": verifier });
        let session = self.token_request("pkce", body).await?;
        info!(user_id = %session.user_id(), "oauth code exchanged");
        self.set_session(Some(session.clone()), AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.current_session() {
            let result = self
                .http
                .post(self.endpoint("/auth/v1/logout"))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await;
            // The local session is dropped regardless; an expired token is
            // already logged out server-side.
            match result {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = response.status().as_u16(), "server logout rejected");
                }
                Err(e) => warn!(error = %e, "server logout failed"),
                Ok(_) => {}
            }
        }

        self.set_session(None, AuthEvent::SignedOut);
        info!("signed out");
        Ok(())
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
