//! Loopback router for the OAuth redirect.
//!
//! SYSTEM CONTEXT
//! ==============
//! The provider sends the browser back to `http://localhost:<port>/auth/callback`.
//! This router is bound to 127.0.0.1 only and serves that callback plus the
//! two pages the browser ends up on.

pub mod auth;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::AuthBackend;
use auth::CallbackOutcome;

/// Handler state: the auth backend and where callback outcomes go.
pub struct CallbackState<A> {
    pub auth: Arc<A>,
    pub outcomes: mpsc::UnboundedSender<CallbackOutcome>,
}

impl<A> Clone for CallbackState<A> {
    fn clone(&self) -> Self {
        Self { auth: Arc::clone(&self.auth), outcomes: self.outcomes.clone() }
    }
}

pub fn router<A: AuthBackend + 'static>(auth: Arc<A>, outcomes: mpsc::UnboundedSender<CallbackOutcome>) -> Router {
    Router::new()
        .route("/auth/callback", get(auth::callback::<A>))
        .route("/auth", get(auth::login_page))
        .route("/", get(auth::home))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(CallbackState { auth, outcomes })
}

/// Serve the callback router until the listener fails.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "oauth callback listener ready");
    }
    axum::serve(listener, router).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
