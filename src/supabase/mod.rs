//! Supabase platform client.
//!
//! ARCHITECTURE
//! ============
//! One `SupabaseClient` implements both backend traits:
//! - `auth`: GoTrue PKCE sign-in, code exchange, refresh and logout
//! - `rest`: `PostgREST` reads, inserts and deletes on `bookmarks`
//! - `realtime`: the Phoenix-channel change feed over a websocket
//! - `storage`: the session file that survives restarts
//!
//! The client holds the current session behind a mutex. Every session
//! transition goes through `set_session`, which persists it and notifies the
//! registered auth listeners.

pub mod auth;
pub mod realtime;
pub mod rest;
pub mod storage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{AuthSubscription, BackendError, Subscription};
use crate::config::Config;
use crate::model::{AuthChange, AuthEvent, Session};
use storage::SessionStore;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    heartbeat: Duration,
    refresh_margin_secs: i64,
    store: SessionStore,
    session: Mutex<Option<Session>>,
    /// Held across a token refresh so concurrent callers share one request.
    refresh_lock: tokio::sync::Mutex<()>,
    /// PKCE verifier of the sign-in in flight, consumed by the code exchange.
    pkce_verifier: Mutex<Option<String>>,
    listeners: Arc<Mutex<AuthListeners>>,
}

#[derive(Default)]
struct AuthListeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<AuthChange>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SupabaseClient {
    /// Build a client and restore any session saved by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let store = SessionStore::new(config.session_file.clone());
        let session = store.load();
        if let Some(session) = &session {
            debug!(user_id = %session.user_id(), path = %store.path().display(), "restored saved session");
        }

        Ok(Self {
            http,
            base_url: config.supabase_url.clone(),
            anon_key: config.anon_key.clone(),
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            refresh_margin_secs: config.refresh_margin_secs,
            store,
            session: Mutex::new(session),
            refresh_lock: tokio::sync::Mutex::new(()),
            pkce_verifier: Mutex::new(None),
            listeners: Arc::new(Mutex::new(AuthListeners::default())),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn current_session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    /// Install (or clear) the session, persist it and notify listeners.
    fn set_session(&self, session: Option<Session>, event: AuthEvent) {
        *lock(&self.session) = session.clone();

        let persisted = match &session {
            Some(session) => self.store.save(session),
            None => self.store.clear(),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "session file update failed");
        }

        self.notify(&AuthChange { event, session });
    }

    fn notify(&self, change: &AuthChange) {
        let mut listeners = lock(&self.listeners);
        listeners
            .senders
            .retain(|_, tx| tx.send(change.clone()).is_ok());
        debug!(event = ?change.event, listeners = listeners.senders.len(), "auth change broadcast");
    }

    fn register_listener(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut listeners = lock(&self.listeners);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.senders.insert(id, tx);
            id
        };

        let registry = Arc::clone(&self.listeners);
        Subscription::new(rx, move || {
            lock(&registry).senders.remove(&id);
        })
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        lock(&self.listeners).senders.len()
    }
}

// =============================================================================
// ERROR BODIES
// =============================================================================

/// Error body fields used by the auth and data endpoints.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
    code: Option<serde_json::Value>,
    error_code: Option<String>,
}

/// Extract the human-readable message and error code from a failed response
/// body. Falls back to the status line when the body is not a known shape.
pub(crate) fn parse_error_body(status: u16, body: &str) -> (String, Option<String>) {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = parsed.error_code.or_else(|| {
        parsed.code.map(|code| match code {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    });

    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() { format!("HTTP {status}") } else { format!("HTTP {status}: {trimmed}") }
        });

    (message, code)
}

/// Read a failed response into `QueryFailed`.
async fn query_failed(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let (message, code) = parse_error_body(status, &body);
    BackendError::QueryFailed { message, code }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
