//! Local view state for the single-screen client.
//!
//! DESIGN
//! ======
//! `SharedView` is the one piece of mutable state the gate, the sync
//! controller and the render loop share. Everything runs on a single thread,
//! so it is an `Rc<RefCell<_>>` rather than a lock; borrows are never held
//! across an `.await`. Each update bumps `version` and signals `Notify`, which
//! the render loop waits on.
//!
//! The bookmark list is a cache with no merge logic: every successful read
//! replaces it wholesale.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::Notify;

use crate::model::{Bookmark, OAuthProvider, sort_newest_first};

// =============================================================================
// VIEW STATE
// =============================================================================

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Loading,
    Login,
    Main,
}

/// Sync controller lifecycle as seen by the view. There is no error state: a
/// failed refetch leaves the label at `Synced` and the data unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Inactive,
    Loading,
    Synced,
}

/// Login screen state: one button and one error line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginView {
    pub error: Option<String>,
    /// A sign-in request is in flight; the button is disabled.
    pub connecting: bool,
    /// Where the user must go to finish signing in.
    pub authorize_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub screen: Screen,
    /// Provider named on the sign-in button.
    pub provider: OAuthProvider,
    pub login: LoginView,
    /// Label for the signed-in account (email, else user id).
    pub account: Option<String>,
    pub bookmarks: Vec<Bookmark>,
    pub title_input: String,
    pub url_input: String,
    /// Blocking alerts not yet shown to the user.
    pub alerts: Vec<String>,
    pub sync: SyncState,
    pub version: u64,
}

impl ViewState {
    /// Replace the whole list with a fresh read result.
    pub fn replace_bookmarks(&mut self, mut bookmarks: Vec<Bookmark>) {
        sort_newest_first(&mut bookmarks);
        self.bookmarks = bookmarks;
    }
}

// =============================================================================
// SHARED HANDLE
// =============================================================================

/// Cheaply cloneable handle to the view state.
#[derive(Clone, Default)]
pub struct SharedView {
    state: Rc<RefCell<ViewState>>,
    changed: Rc<Notify>,
}

impl SharedView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Mutate the state and wake the render loop.
    pub fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let result = {
            let mut state = self.state.borrow_mut();
            let result = f(&mut state);
            state.version += 1;
            result
        };
        self.changed.notify_one();
        result
    }

    /// Resolves after the next update (immediately if one happened since the
    /// last wait).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    #[must_use]
    pub fn screen(&self) -> Screen {
        self.read(|s| s.screen)
    }

    /// Route to the login screen, dropping everything tied to the old session.
    pub fn show_login(&self) {
        self.update(|s| {
            s.screen = Screen::Login;
            s.account = None;
            s.bookmarks.clear();
            s.title_input.clear();
            s.url_input.clear();
        });
    }

    pub fn show_main(&self, account: String) {
        self.update(|s| {
            s.screen = Screen::Main;
            s.account = Some(account);
            s.login = LoginView::default();
        });
    }

    pub fn set_login_error(&self, message: Option<String>) {
        self.update(|s| s.login.error = message);
    }

    /// Queue a blocking alert.
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.alerts.push(message));
    }

    /// Drain queued alerts for display.
    pub fn take_alerts(&self) -> Vec<String> {
        std::mem::take(&mut self.state.borrow_mut().alerts)
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.update(|s| s.title_input = title);
    }

    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.update(|s| s.url_input = url);
    }

    pub fn clear_inputs(&self) {
        self.update(|s| {
            s.title_input.clear();
            s.url_input.clear();
        });
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
