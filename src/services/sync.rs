//! Bookmark sync controller: initial read, change-triggered refetch,
//! add/remove.
//!
//! DESIGN
//! ======
//! `activate` runs the first read and opens the change subscription
//! concurrently, then spawns a local pump task. Every notification the pump
//! receives spawns an independent full refetch. Notifications are triggers
//! only: payloads are logged, never applied, and rapid bursts are not
//! coalesced.
//!
//! Overlapping reads are not cancelled or ordered. Whichever completes last
//! wins the view, so callers must not assume monotonic freshness. Reads that
//! complete after `deactivate` are discarded.
//!
//! Mutations never touch the list directly. A successful insert clears the
//! inputs and a successful delete does nothing; the refresh arrives through
//! the subscription.
//!
//! ERROR HANDLING
//! ==============
//! Read failures are logged and leave the previous list in place (no
//! user-visible surface). Mutation failures become blocking alerts. Nothing
//! is retried.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, BookmarkBackend, SubscriptionGuard};
use crate::model::{BookmarkId, ChangeEvent, ChangeFilter, NewBookmark, UserId};
use crate::state::{SharedView, SyncState};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Title or URL was empty; nothing was sent to the backend.
    #[error("title and url are required")]
    MissingInput,

    #[error("not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

// =============================================================================
// HANDLE
// =============================================================================

/// One activation of the controller. Owns the change subscription; must be
/// passed back to [`BookmarkSync::deactivate`] when the session ends.
pub struct SyncHandle {
    user_id: UserId,
    live: Rc<Cell<bool>>,
    guard: Option<SubscriptionGuard>,
    pump: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// True while a change subscription is attached.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.guard.is_some()
    }

    fn close(&mut self) -> bool {
        if !self.live.replace(false) {
            return false;
        }
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        true
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if self.close() {
            warn!(user_id = %self.user_id, "sync handle dropped without deactivate; subscription released");
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Keeps the view's bookmark list in step with the backend for one user.
pub struct BookmarkSync<B> {
    backend: Arc<B>,
    view: SharedView,
}

impl<B> BookmarkSync<B> {
    pub fn new(backend: Arc<B>, view: SharedView) -> Self {
        Self { backend, view }
    }

    /// Close the change subscription and stop the pump. In-flight reads are
    /// left to finish; their results are dropped.
    pub fn deactivate(&self, mut handle: SyncHandle) {
        if handle.close() {
            info!(user_id = %handle.user_id, "bookmark sync deactivated");
        }
        self.view.update(|s| s.sync = SyncState::Inactive);
    }
}

impl<B: BookmarkBackend + 'static> BookmarkSync<B> {
    /// Read `user_id`'s bookmarks into the view and start following changes.
    ///
    /// Must be called inside a `LocalSet`: the notification pump is a local task.
    pub async fn activate(&self, user_id: UserId) -> SyncHandle {
        let live = Rc::new(Cell::new(true));
        self.view.update(|s| s.sync = SyncState::Loading);

        let ((), subscription) = tokio::join!(
            refetch(&*self.backend, &self.view, user_id, &live),
            self.backend.subscribe_changes(user_id, ChangeFilter::All),
        );

        let (guard, pump) = match subscription {
            Ok(subscription) => {
                let (rx, guard) = subscription.into_parts();
                let pump = tokio::task::spawn_local(pump_changes(
                    self.backend.clone(),
                    self.view.clone(),
                    user_id,
                    live.clone(),
                    rx,
                ));
                (Some(guard), Some(pump))
            }
            Err(e) => {
                error!(error = %e, %user_id, "change subscription failed; live updates disabled");
                (None, None)
            }
        };

        info!(%user_id, subscribed = guard.is_some(), "bookmark sync activated");
        SyncHandle { user_id, live, guard, pump }
    }

    /// Insert a bookmark. Empty `title` or `url` is rejected locally.
    ///
    /// # Errors
    ///
    /// Returns `MissingInput` without calling the backend, or the backend
    /// error after raising an alert.
    pub async fn add(&self, title: &str, url: &str, user_id: UserId) -> Result<(), SyncError> {
        if title.is_empty() || url.is_empty() {
            return Err(SyncError::MissingInput);
        }

        let insert = NewBookmark { title: title.to_owned(), url: url.to_owned(), user_id };
        match self.backend.insert_bookmark(&insert).await {
            Ok(()) => {
                self.view.clear_inputs();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, %user_id, "bookmark insert failed");
                self.view
                    .alert(format!("Failed to add bookmark: {}", e.user_message()));
                Err(e.into())
            }
        }
    }

    /// Delete a bookmark by id.
    ///
    /// # Errors
    ///
    /// Returns the backend error after raising an alert.
    pub async fn remove(&self, id: &BookmarkId) -> Result<(), SyncError> {
        match self.backend.delete_bookmark(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, bookmark_id = %id, "bookmark delete failed");
                self.view
                    .alert(format!("Failed to delete: {}", e.user_message()));
                Err(e.into())
            }
        }
    }
}

/// One full read. Success replaces the list; failure is logged only.
async fn refetch<B: BookmarkBackend + ?Sized>(backend: &B, view: &SharedView, user_id: UserId, live: &Cell<bool>) {
    match backend.list_bookmarks(user_id).await {
        Ok(bookmarks) => {
            if !live.get() {
                debug!(%user_id, "discarding read that completed after deactivate");
                return;
            }
            debug!(%user_id, count = bookmarks.len(), "bookmarks refreshed");
            view.update(|s| {
                s.replace_bookmarks(bookmarks);
                s.sync = SyncState::Synced;
            });
        }
        Err(e) => error!(error = %e, %user_id, "bookmark read failed"),
    }
}

async fn pump_changes<B: BookmarkBackend + 'static>(
    backend: Arc<B>,
    view: SharedView,
    user_id: UserId,
    live: Rc<Cell<bool>>,
    mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
) {
    while let Some(event) = rx.recv().await {
        if !live.get() {
            break;
        }
        info!(kind = ?event.kind, table = %event.table, "realtime change");
        debug!(payload = %event.payload, "realtime change payload");

        let backend = backend.clone();
        let view = view.clone();
        let live = live.clone();
        tokio::task::spawn_local(async move {
            refetch(&*backend, &view, user_id, &live).await;
        });
    }
    if live.get() {
        warn!(%user_id, "change feed closed; live updates stopped until the next session change");
    } else {
        debug!(%user_id, "change pump stopped");
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
