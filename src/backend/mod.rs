//! Backend contract consumed by the session gate and the sync controller.
//!
//! ARCHITECTURE
//! ============
//! The managed platform is reached through two traits: `AuthBackend` for the
//! identity/session provider and `BookmarkBackend` for the bookmark collection
//! and its change feed. `supabase::SupabaseClient` implements both against the
//! real platform; `memory::MemoryBackend` implements both in-process.
//!
//! Subscriptions are explicit handles. Dropping a handle releases the
//! registration, so a forgotten `unsubscribe()` never leaves a listener
//! attached to a torn-down view.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::{AuthChange, Bookmark, BookmarkId, ChangeEvent, ChangeFilter, NewBookmark, OAuthProvider, Session, UserId};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A read, insert or delete was rejected by the backend.
    #[error("query failed: {message}")]
    QueryFailed { message: String, code: Option<String> },

    /// The provider rejected an OAuth code.
    #[error("session exchange failed: {0}")]
    SessionExchangeFailed(String),

    /// The call needs a session and none is held.
    #[error("not signed in")]
    NotAuthenticated,

    #[error("request failed: {0}")]
    Request(String),

    #[error("response parse failed: {0}")]
    Parse(String),

    #[error("session storage failed: {0}")]
    Storage(String),

    #[error("realtime error: {0}")]
    Realtime(String),
}

impl BackendError {
    /// Message suitable for an alert: the backend's own wording for rejected
    /// queries, the full error otherwise.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::QueryFailed { message, .. } | Self::SessionExchangeFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

type Release = Box<dyn FnOnce() + Send>;

/// Detaches a registration from its source when released or dropped.
pub struct SubscriptionGuard {
    release: Option<Release>,
}

impl SubscriptionGuard {
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// A live registration that yields notifications until unsubscribed.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    guard: SubscriptionGuard,
}

/// Session-change listener registration.
pub type AuthSubscription = Subscription<AuthChange>;

/// Change-feed registration for one user's bookmarks.
pub type ChangeSubscription = Subscription<ChangeEvent>;

impl<T> Subscription<T> {
    /// Wrap a receiver with the closure that detaches it from its source.
    pub fn new(rx: mpsc::UnboundedReceiver<T>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, guard: SubscriptionGuard { release: Some(Box::new(release)) } }
    }

    /// Next notification, or `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Detach from the source. Notifications already queued are discarded.
    pub fn unsubscribe(self) {
        self.guard.release();
    }

    /// Split into the receiving end and the guard that owns the registration,
    /// so the two can live in different places.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, SubscriptionGuard) {
        (self.rx, self.guard)
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Identity/session provider.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session, or `None` when signed out.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Register a session-change listener.
    fn on_auth_state_change(&self) -> AuthSubscription;

    /// Start an OAuth sign-in and return the URL the user must visit.
    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError>;

    /// Complete an OAuth sign-in with the code from the callback.
    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// The bookmark collection and its change feed.
#[async_trait]
pub trait BookmarkBackend: Send + Sync {
    /// All bookmarks owned by `user_id`, newest first.
    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<Bookmark>, BackendError>;

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<(), BackendError>;

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<(), BackendError>;

    /// Open a change subscription scoped to `user_id`.
    async fn subscribe_changes(&self, user_id: UserId, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
