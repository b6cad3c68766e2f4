//! Session gate: decides between the login screen and the bookmark screen,
//! and owns the sync controller's lifecycle.
//!
//! LIFECYCLE
//! =========
//! 1. `activate` registers the session-change listener, then queries the
//!    current session. A query error counts as "no session" (fail closed).
//! 2. Each change from the listener goes through `handle_auth_change`. Any
//!    running controller is deactivated first, so there is never more than
//!    one change subscription per session. A present session then activates
//!    a fresh controller and an absent one routes to login.
//! 3. `teardown` unregisters the listener and deactivates the controller.
//!
//! REFRESH
//! =======
//! Nothing else keeps an idle session alive, so the gate schedules a session
//! query `refresh_lead_secs` before the access token expires. The backend
//! refreshes there and the `TokenRefreshed` change re-subscribes the feed
//! with the new token. A query that leaves the session unchanged is retried
//! after `REFRESH_RETRY`, never in a tight loop.
//!
//! Sign-in errors land on the login screen's error line; they are never
//! returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::sync::{BookmarkSync, SyncError, SyncHandle};
use crate::backend::{AuthBackend, AuthSubscription, BookmarkBackend};
use crate::config::DEFAULT_SESSION_REFRESH_MARGIN_SECS;
use crate::model::{AuthChange, BookmarkId, OAuthProvider, Session, UserId};
use crate::state::SharedView;

const REFRESH_RETRY: Duration = Duration::from_secs(30);

pub struct SessionGate<A, B> {
    auth: Arc<A>,
    sync: BookmarkSync<B>,
    view: SharedView,
    provider: OAuthProvider,
    redirect_to: String,
    listener: Option<AuthSubscription>,
    session: Option<Session>,
    active: Option<SyncHandle>,
    refresh_lead_secs: i64,
    refresh_retry_at: Option<Instant>,
}

impl<A, B> SessionGate<A, B> {
    /// Build a gate around explicitly constructed backend handles.
    /// `redirect_to` is the OAuth callback location handed to the provider.
    pub fn new(
        auth: Arc<A>,
        bookmarks: Arc<B>,
        view: SharedView,
        provider: OAuthProvider,
        redirect_to: impl Into<String>,
    ) -> Self {
        view.update(|s| s.provider = provider);
        Self {
            auth,
            sync: BookmarkSync::new(bookmarks, view.clone()),
            view,
            provider,
            redirect_to: redirect_to.into(),
            listener: None,
            session: None,
            active: None,
            refresh_lead_secs: DEFAULT_SESSION_REFRESH_MARGIN_SECS,
            refresh_retry_at: None,
        }
    }

    /// How long before expiry the session is refreshed.
    #[must_use]
    pub fn with_refresh_lead(mut self, secs: i64) -> Self {
        self.refresh_lead_secs = secs;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(Session::user_id)
    }

    #[must_use]
    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    /// True while the sync controller is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.active.is_some()
    }

    /// True while the session-change listener is registered.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// When the current session should next be refreshed. `None` without a
    /// session or when the session never expires.
    #[must_use]
    pub fn refresh_deadline(&self) -> Option<Instant> {
        let expires_at = self.session.as_ref()?.expires_at?;
        let now_unix = OffsetDateTime::now_utc().unix_timestamp();
        let until_due = u64::try_from(expires_at - self.refresh_lead_secs - now_unix).unwrap_or(0);
        let due = Instant::now() + Duration::from_secs(until_due);
        Some(self.refresh_retry_at.map_or(due, |retry| due.max(retry)))
    }

    /// Show a callback-stage or other sign-in error on the login screen.
    pub fn show_login_error(&self, message: impl Into<String>) {
        self.view.set_login_error(Some(message.into()));
    }

    /// Unregister the listener and stop the controller.
    pub fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.unsubscribe();
        }
        self.deactivate_sync();
        info!("session gate torn down");
    }

    fn deactivate_sync(&mut self) {
        if let Some(handle) = self.active.take() {
            self.sync.deactivate(handle);
        }
    }
}

impl<A: AuthBackend + 'static, B: BookmarkBackend + 'static> SessionGate<A, B> {
    /// Register for session changes and route on the current session.
    pub async fn activate(&mut self) {
        if self.listener.is_none() {
            self.listener = Some(self.auth.on_auth_state_change());
        }

        let session = match self.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session query failed; routing to login");
                None
            }
        };
        self.apply_session(session).await;
    }

    /// Next session-change notification. Pending forever when no listener is
    /// registered, so it can sit in a `select!` unconditionally. A listener
    /// whose source has gone away is dropped after reporting `None` once.
    pub async fn next_auth_change(&mut self) -> Option<AuthChange> {
        let Some(listener) = self.listener.as_mut() else {
            return std::future::pending().await;
        };
        let change = listener.recv().await;
        if change.is_none() {
            warn!("session-change source closed");
            self.listener = None;
        }
        change
    }

    /// Query the session so the backend refreshes it. A new session arrives
    /// as a `TokenRefreshed` change; a failed refresh as `SignedOut`.
    pub async fn refresh_session(&mut self) {
        self.refresh_retry_at = Some(Instant::now() + REFRESH_RETRY);
        match self.auth.get_session().await {
            Ok(Some(session)) => debug!(expires_at = ?session.expires_at, "scheduled session check"),
            Ok(None) => debug!("scheduled session check found no session"),
            Err(e) => warn!(error = %e, "scheduled session refresh failed"),
        }
    }

    pub async fn handle_auth_change(&mut self, change: AuthChange) {
        info!(event = ?change.event, signed_in = change.session.is_some(), "session changed");
        self.apply_session(change.session).await;
    }

    async fn apply_session(&mut self, session: Option<Session>) {
        self.deactivate_sync();
        self.refresh_retry_at = None;

        let Some(session) = session else {
            self.session = None;
            self.view.show_login();
            return;
        };

        let user_id = session.user_id();
        let account = session
            .user
            .email
            .clone()
            .unwrap_or_else(|| user_id.to_string());
        self.session = Some(session);
        self.view.show_main(account);
        self.active = Some(self.sync.activate(user_id).await);
    }

    /// Request an OAuth sign-in. The authorize URL (or the provider's error)
    /// is placed on the login screen.
    pub async fn sign_in(&self) {
        self.view.update(|s| {
            s.login.connecting = true;
            s.login.error = None;
            s.login.authorize_url = None;
        });

        let result = self
            .auth
            .sign_in_with_oauth(self.provider, &self.redirect_to)
            .await;
        if let Err(e) = &result {
            error!(error = %e, provider = %self.provider, "oauth sign-in request failed");
        }

        self.view.update(|s| {
            s.login.connecting = false;
            match result {
                Ok(url) => s.login.authorize_url = Some(url),
                Err(e) => s.login.error = Some(e.user_message()),
            }
        });
    }

    /// End the session. The resulting `SignedOut` notification routes to login.
    pub async fn sign_out(&self) {
        if let Err(e) = self.auth.sign_out().await {
            error!(error = %e, "sign out failed");
        }
    }

    /// Add a bookmark for the signed-in user.
    ///
    /// # Errors
    ///
    /// `NotSignedIn` without a session, otherwise as [`BookmarkSync::add`].
    pub async fn add(&self, title: &str, url: &str) -> Result<(), SyncError> {
        let user_id = self.user_id().ok_or(SyncError::NotSignedIn)?;
        self.sync.add(title, url, user_id).await
    }

    /// Delete a bookmark.
    ///
    /// # Errors
    ///
    /// `NotSignedIn` without a session, otherwise as [`BookmarkSync::remove`].
    pub async fn remove(&self, id: &BookmarkId) -> Result<(), SyncError> {
        if self.session.is_none() {
            return Err(SyncError::NotSignedIn);
        }
        self.sync.remove(id).await
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
