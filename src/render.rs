//! Plain-text rendering of the view state.
//!
//! Output goes to stdout as whole frames; logs go to stderr, so the two never
//! interleave mid-line.

use std::fmt::Write as _;

use crate::state::{Screen, SharedView, SyncState, ViewState};

pub const APP_TITLE: &str = "Smart Bookmark App";
pub const MAIN_TITLE: &str = "My Bookmarks";
pub const EMPTY_LIST: &str = "No bookmarks yet. Add one!";

/// Render the current screen plus any alerts queued on the state.
#[must_use]
pub fn screen(state: &ViewState) -> String {
    let mut out = match state.screen {
        Screen::Loading => "Loading...\n".to_owned(),
        Screen::Login => login(state),
        Screen::Main => main_screen(state),
    };
    out.push_str(&alerts(&state.alerts));
    out
}

/// Render the shared view and drain its alerts, so each alert is shown once.
#[must_use]
pub fn frame(view: &SharedView) -> String {
    let out = view.read(screen);
    view.take_alerts();
    out
}

fn login(state: &ViewState) -> String {
    let mut out = heading(APP_TITLE);
    let button = if state.login.connecting {
        "Connecting...".to_owned()
    } else {
        format!("Sign in with {}", state.provider.display_name())
    };
    let _ = writeln!(out, "  [ {button} ]  (type `login`)");

    if let Some(url) = &state.login.authorize_url {
        let _ = writeln!(out, "\n  Open this address in your browser to continue:\n  {url}");
    }
    if let Some(error) = &state.login.error {
        let _ = writeln!(out, "\n  ! {error}");
    }
    out
}

fn main_screen(state: &ViewState) -> String {
    let mut out = heading(MAIN_TITLE);
    if let Some(account) = &state.account {
        let _ = writeln!(out, "Signed in as {account}   [ Logout ]  (type `logout`)");
    }

    let _ = writeln!(
        out,
        "\nTitle: [{}]   URL: [{}]   [ Add Bookmark ]  (type `add`)\n",
        placeholder(&state.title_input, "Title"),
        placeholder(&state.url_input, "https://example.com"),
    );

    if state.bookmarks.is_empty() {
        let line = if state.sync == SyncState::Loading { "Loading bookmarks..." } else { EMPTY_LIST };
        let _ = writeln!(out, "  {line}");
        return out;
    }

    for (n, bookmark) in state.bookmarks.iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. {}   [ Delete ]  (type `delete {}`)", n + 1, bookmark.title, n + 1);
        let _ = writeln!(out, "      {}", bookmark.url);
    }
    out
}

fn heading(title: &str) -> String {
    format!("{title}\n{}\n", "=".repeat(title.chars().count()))
}

fn placeholder<'a>(value: &'a str, hint: &'a str) -> &'a str {
    if value.is_empty() { hint } else { value }
}

fn alerts(alerts: &[String]) -> String {
    alerts.iter().fold(String::new(), |mut out, alert| {
        let _ = writeln!(out, "\n  !! {alert}");
        out
    })
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
