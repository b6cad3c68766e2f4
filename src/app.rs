//! Terminal front end: command parsing and the single-threaded event loop.
//!
//! EVENT LOOP
//! ==========
//! One `select!` multiplexes every input the client has:
//! - stdin lines, parsed into `Command`s
//! - session changes from the gate's listener
//! - outcomes from the OAuth callback listener
//! - view updates, which trigger a redraw
//! - the session refresh deadline
//! - Ctrl-C
//!
//! The loop must run inside a `LocalSet`; the sync controller spawns its
//! change pump with `spawn_local`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

use crate::backend::{AuthBackend, BookmarkBackend};
use crate::config::callback_url;
use crate::model::{BookmarkId, OAuthProvider};
use crate::render;
use crate::routes;
use crate::services::gate::SessionGate;
use crate::services::sync::SyncError;
use crate::state::{Screen, SharedView, ViewState};

pub const ADD_HINT: &str = "Enter both a title and a URL first (`title <text>`, `url <text>`).";

pub const HELP: &str = "\
Commands:
  login            sign in with the configured provider
  logout           end the session
  title <text>     set the title input
  url <text>       set the URL input
  add              add a bookmark from the inputs
  delete <n|id>    delete bookmark number n (or by id)
  list             redraw the screen
  help             show this help
  quit             exit";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to bind callback listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("unknown command `{0}`; type `help` for the list")]
    Unknown(String),

    #[error("`{0}` needs an argument; type `help` for usage")]
    MissingArgument(&'static str),
}

// =============================================================================
// COMMANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login,
    Logout,
    Title(String),
    Url(String),
    Add,
    Delete(String),
    List,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Unknown verbs and a `delete` without a target.
    pub fn parse(line: &str) -> Result<Option<Self>, UsageError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        let command = match verb.to_ascii_lowercase().as_str() {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "title" => Self::Title(rest.to_owned()),
            "url" => Self::Url(rest.to_owned()),
            "add" => Self::Add,
            "delete" | "del" | "rm" => {
                if rest.is_empty() {
                    return Err(UsageError::MissingArgument("delete"));
                }
                Self::Delete(rest.to_owned())
            }
            "list" | "ls" => Self::List,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(UsageError::Unknown(other.to_owned())),
        };
        Ok(Some(command))
    }

    /// Why this command cannot run on `screen`, if it cannot.
    #[must_use]
    pub fn unavailable_on(&self, screen: Screen) -> Option<&'static str> {
        match (self, screen) {
            (Self::Help | Self::Quit | Self::List, _) => None,
            (_, Screen::Loading) => Some("Still loading; try again in a moment."),
            (Self::Login, Screen::Main) => Some("Already signed in."),
            (Self::Login, Screen::Login) => None,
            (_, Screen::Login) => Some("Sign in first (`login`)."),
            (_, Screen::Main) => None,
        }
    }
}

/// Resolve a `delete` target: a 1-based position in the list, else an id.
#[must_use]
pub fn resolve_delete(state: &ViewState, target: &str) -> Option<BookmarkId> {
    if let Ok(n) = target.parse::<usize>() {
        if let Some(bookmark) = n.checked_sub(1).and_then(|i| state.bookmarks.get(i)) {
            return Some(bookmark.id.clone());
        }
    }
    state
        .bookmarks
        .iter()
        .find(|b| b.id.as_str() == target)
        .map(|b| b.id.clone())
}

/// Run one command against the gate. Returns a line to print, if any.
pub async fn execute<A, B>(gate: &SessionGate<A, B>, view: &SharedView, command: Command) -> Option<String>
where
    A: AuthBackend + 'static,
    B: BookmarkBackend + 'static,
{
    if let Some(reason) = command.unavailable_on(view.screen()) {
        return Some(reason.to_owned());
    }

    match command {
        Command::Login => gate.sign_in().await,
        Command::Logout => gate.sign_out().await,
        Command::Title(title) => view.set_title(title),
        Command::Url(url) => view.set_url(url),
        Command::Add => {
            let (title, url) = view.read(|s| (s.title_input.clone(), s.url_input.clone()));
            match gate.add(&title, &url).await {
                Err(SyncError::MissingInput) => return Some(ADD_HINT.to_owned()),
                Err(SyncError::NotSignedIn) => return Some("Sign in first (`login`).".to_owned()),
                // Backend failures were already raised as alerts.
                Err(SyncError::Backend(_)) | Ok(()) => {}
            }
        }
        Command::Delete(target) => {
            let Some(id) = view.read(|s| resolve_delete(s, &target)) else {
                return Some(format!("No bookmark matches `{target}`."));
            };
            match gate.remove(&id).await {
                Err(SyncError::NotSignedIn) => return Some("Sign in first (`login`).".to_owned()),
                // Backend failures were already raised as alerts.
                Err(SyncError::Backend(_) | SyncError::MissingInput) | Ok(()) => {}
            }
        }
        Command::List => return Some(render::frame(view)),
        Command::Help => return Some(HELP.to_owned()),
        Command::Quit => {}
    }
    None
}

// =============================================================================
// EVENT LOOP
// =============================================================================

/// Runtime options for the terminal client.
#[derive(Debug, Clone, Copy)]
pub struct AppOptions {
    pub provider: OAuthProvider,
    pub callback_port: u16,
    /// Seconds before token expiry at which the session is refreshed.
    pub refresh_lead_secs: i64,
}

/// Run the client until `quit`, end of input or Ctrl-C.
///
/// # Errors
///
/// Fails if the callback port cannot be bound or the terminal breaks.
pub async fn run<T>(backend: Arc<T>, options: AppOptions) -> Result<(), AppError>
where
    T: AuthBackend + BookmarkBackend + 'static,
{
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, options.callback_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind { addr, source })?;
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let server = tokio::spawn(routes::serve(listener, routes::router(Arc::clone(&backend), outcome_tx)));

    let view = SharedView::new();
    let mut gate = SessionGate::new(
        Arc::clone(&backend),
        backend,
        view.clone(),
        options.provider,
        callback_url(options.callback_port),
    )
    .with_refresh_lead(options.refresh_lead_secs);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    draw(&mut stdout, &render::frame(&view)).await?;
    gate.activate().await;

    let result = loop {
        let refresh_at = gate.refresh_deadline();
        tokio::select! {
            () = view.changed() => {
                if let Err(e) = draw(&mut stdout, &render::frame(&view)).await {
                    break Err(e);
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(AppError::Io(e)),
                };
                let reply = match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break Ok(()),
                    Ok(Some(command)) => execute(&gate, &view, command).await,
                    Ok(None) => None,
                    Err(e) => Some(e.to_string()),
                };
                if let Some(reply) = reply {
                    if let Err(e) = draw(&mut stdout, &reply).await {
                        break Err(e);
                    }
                }
            }
            Some(change) = gate.next_auth_change() => {
                gate.handle_auth_change(change).await;
            }
            () = sleep_until(refresh_at) => {
                gate.refresh_session().await;
            }
            Some(outcome) = outcomes.recv() => {
                if let Err(e) = outcome {
                    gate.show_login_error(e.user_message());
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    gate.teardown();
    server.abort();
    info!("client stopped");
    result
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn draw(stdout: &mut tokio::io::Stdout, text: &str) -> Result<(), AppError> {
    let mut frame = String::with_capacity(text.len() + 8);
    frame.push('\n');
    frame.push_str(text);
    if !text.ends_with('\n') {
        frame.push('\n');
    }
    frame.push_str("> ");
    stdout.write_all(frame.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
