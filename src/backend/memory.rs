//! In-process backend: session provider, bookmark collection and change feed
//! held in memory.
//!
//! Used as the test double for gate/controller flows and by `--demo` mode.
//! Writes notify matching change subscribers the way the platform's feed
//! does, so a flow exercised against it sees the same insert → notification
//! → refetch round trip. Failures can be injected per operation and every
//! backend call is counted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use super::{AuthBackend, AuthSubscription, BackendError, BookmarkBackend, ChangeSubscription, Subscription};
use crate::model::{
    AuthChange, AuthEvent, Bookmark, BookmarkId, ChangeEvent, ChangeFilter, ChangeKind, NewBookmark, OAuthProvider,
    Session, SessionUser, UserId, sort_newest_first,
};

const TABLE: &str = "bookmarks";

struct ChangeListener {
    user_id: UserId,
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    session_query_error: Option<String>,
    sign_in_error: Option<String>,
    read_error: Option<String>,
    insert_error: Option<String>,
    delete_error: Option<String>,
    accepted_codes: HashMap<String, Session>,
    bookmarks: Vec<Bookmark>,
    last_created: Option<OffsetDateTime>,
    read_holds: HashMap<UserId, Arc<Notify>>,
    session_queries: usize,
    reads: usize,
    inserts: usize,
    deletes: usize,
    next_listener_id: u64,
    auth_listeners: HashMap<u64, mpsc::UnboundedSender<AuthChange>>,
    change_listeners: HashMap<u64, ChangeListener>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_listener_id += 1;
        self.next_listener_id
    }

    fn broadcast_auth(&mut self, change: &AuthChange) {
        self.auth_listeners
            .retain(|_, tx| tx.send(change.clone()).is_ok());
    }

    fn broadcast_change(&mut self, user_id: UserId, kind: ChangeKind, record: serde_json::Value) {
        self.change_listeners.retain(|_, listener| {
            if listener.user_id != user_id || !listener.filter.matches(kind) {
                return true;
            }
            let event = ChangeEvent { kind, table: TABLE.to_owned(), payload: record.clone() };
            listener.tx.send(event).is_ok()
        });
    }

    /// Creation timestamps are strictly increasing so ordering is deterministic.
    fn next_created_at(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        created
    }
}

/// Shared-handle in-memory backend. Clones observe the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that already holds a session for `user_id`.
    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        let backend = Self::new();
        backend.lock().session = Some(test_session(user_id));
        backend
    }

    /// Demo backend: a signed-in user with a few bookmarks.
    #[must_use]
    pub fn demo() -> Self {
        let user_id = UserId(Uuid::new_v4());
        let backend = Self::signed_in(user_id);
        for (title, url) in [
            ("The Rust Programming Language", "https://doc.rust-lang.org/book/"),
            ("Tokio tutorial", "https://tokio.rs/tokio/tutorial"),
        ] {
            backend.seed(user_id, title, url);
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Seeding and simulation
    // -------------------------------------------------------------------------

    /// Store a bookmark without counting it as an insert or notifying anyone.
    pub fn seed(&self, user_id: UserId, title: &str, url: &str) -> Bookmark {
        let mut inner = self.lock();
        let bookmark = Bookmark {
            id: BookmarkId::new(Uuid::new_v4().to_string()),
            user_id,
            title: title.to_owned(),
            url: url.to_owned(),
            created_at: inner.next_created_at(),
        };
        inner.bookmarks.push(bookmark.clone());
        bookmark
    }

    /// Store a bookmark with an explicit creation time.
    pub fn seed_at(&self, user_id: UserId, title: &str, url: &str, created_at: OffsetDateTime) -> Bookmark {
        let bookmark = Bookmark {
            id: BookmarkId::new(Uuid::new_v4().to_string()),
            user_id,
            title: title.to_owned(),
            url: url.to_owned(),
            created_at,
        };
        self.lock().bookmarks.push(bookmark.clone());
        bookmark
    }

    /// Deliver a change notification to `user_id`'s subscribers without
    /// touching stored data.
    pub fn emit_change(&self, user_id: UserId, kind: ChangeKind) {
        self.lock()
            .broadcast_change(user_id, kind, serde_json::Value::Null);
    }

    /// Replace the session and notify session listeners.
    pub fn emit_auth(&self, event: AuthEvent, session: Option<Session>) {
        let mut inner = self.lock();
        inner.session.clone_from(&session);
        inner.broadcast_auth(&AuthChange { event, session });
    }

    /// Make `code` exchangeable for a session of `user_id`.
    pub fn accept_code(&self, code: &str, user_id: UserId) {
        self.lock()
            .accepted_codes
            .insert(code.to_owned(), test_session(user_id));
    }

    pub fn fail_session_query(&self, message: Option<&str>) {
        self.lock().session_query_error = message.map(str::to_owned);
    }

    pub fn fail_sign_in(&self, message: Option<&str>) {
        self.lock().sign_in_error = message.map(str::to_owned);
    }

    pub fn fail_reads(&self, message: Option<&str>) {
        self.lock().read_error = message.map(str::to_owned);
    }

    pub fn fail_inserts(&self, message: Option<&str>) {
        self.lock().insert_error = message.map(str::to_owned);
    }

    pub fn fail_deletes(&self, message: Option<&str>) {
        self.lock().delete_error = message.map(str::to_owned);
    }

    /// Park `user_id`'s reads until [`release_reads`](Self::release_reads).
    /// Parked reads return the data stored at release time.
    pub fn hold_reads(&self, user_id: UserId) {
        self.lock()
            .read_holds
            .entry(user_id)
            .or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Let `user_id`'s parked reads complete.
    pub fn release_reads(&self, user_id: UserId) {
        if let Some(hold) = self.lock().read_holds.remove(&user_id) {
            hold.notify_waiters();
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn session_queries(&self) -> usize {
        self.lock().session_queries
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    #[must_use]
    pub fn inserts(&self) -> usize {
        self.lock().inserts
    }

    #[must_use]
    pub fn deletes(&self) -> usize {
        self.lock().deletes
    }

    #[must_use]
    pub fn auth_listener_count(&self) -> usize {
        self.lock().auth_listeners.len()
    }

    #[must_use]
    pub fn change_listener_count(&self) -> usize {
        self.lock().change_listeners.len()
    }

    /// Stored bookmarks for `user_id`, newest first.
    #[must_use]
    pub fn stored(&self, user_id: UserId) -> Vec<Bookmark> {
        let mut list: Vec<_> = self
            .lock()
            .bookmarks
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut list);
        list
    }
}

/// A session with long-lived placeholder tokens for `user_id`.
#[must_use]
pub fn test_session(user_id: UserId) -> Session {
    Session {
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: None,
        user: SessionUser { id: user_id, email: Some(format!("{user_id}@example.com")) },
    }
}

fn query_failed(message: &str) -> BackendError {
    BackendError::QueryFailed { message: message.to_owned(), code: None }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let mut inner = self.lock();
        inner.session_queries += 1;
        if let Some(message) = &inner.session_query_error {
            return Err(BackendError::Request(message.clone()));
        }
        Ok(inner.session.clone())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id();
            inner.auth_listeners.insert(id, tx);
            id
        };
        let inner = self.inner.clone();
        Subscription::new(rx, move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .auth_listeners
                .remove(&id);
        })
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError> {
        if let Some(message) = &self.lock().sign_in_error {
            return Err(BackendError::Request(message.clone()));
        }
        Ok(format!("memory://authorize?provider={provider}&redirect_to={redirect_to}"))
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError> {
        let mut inner = self.lock();
        let Some(session) = inner.accepted_codes.remove(code) else {
            return Err(BackendError::SessionExchangeFailed("invalid flow state, no valid flow state found".into()));
        };
        inner.session = Some(session.clone());
        inner.broadcast_auth(&AuthChange { event: AuthEvent::SignedIn, session: Some(session.clone()) });
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.session = None;
        inner.broadcast_auth(&AuthChange { event: AuthEvent::SignedOut, session: None });
        Ok(())
    }
}

#[async_trait]
impl BookmarkBackend for MemoryBackend {
    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<Bookmark>, BackendError> {
        let hold = {
            let mut inner = self.lock();
            inner.reads += 1;
            if let Some(message) = &inner.read_error {
                return Err(query_failed(message));
            }
            inner.read_holds.get(&user_id).cloned()
        };
        if let Some(hold) = hold {
            hold.notified().await;
        }
        Ok(self.stored(user_id))
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.inserts += 1;
        if let Some(message) = &inner.insert_error {
            return Err(query_failed(message));
        }
        let stored = Bookmark {
            id: BookmarkId::new(Uuid::new_v4().to_string()),
            user_id: bookmark.user_id,
            title: bookmark.title.clone(),
            url: bookmark.url.clone(),
            created_at: inner.next_created_at(),
        };
        let record = serde_json::to_value(&stored).unwrap_or_default();
        inner.bookmarks.push(stored);
        inner.broadcast_change(bookmark.user_id, ChangeKind::Insert, record);
        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.deletes += 1;
        if let Some(message) = &inner.delete_error {
            return Err(query_failed(message));
        }
        let Some(pos) = inner.bookmarks.iter().position(|b| &b.id == id) else {
            return Ok(());
        };
        let removed = inner.bookmarks.remove(pos);
        let record = serde_json::json!({ "id": removed.id });
        inner.broadcast_change(removed.user_id, ChangeKind::Delete, record);
        Ok(())
    }

    async fn subscribe_changes(&self, user_id: UserId, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id();
            inner
                .change_listeners
                .insert(id, ChangeListener { user_id, filter, tx });
            id
        };
        let inner = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .change_listeners
                .remove(&id);
        }))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
