//! Smart Bookmarks: a terminal bookmark manager backed by Supabase.
//!
//! Sign in with OAuth, then add, list and delete bookmarks scoped to your
//! account. The list refreshes whenever the platform's change feed reports a
//! write, including writes from other clients.

pub mod app;
pub mod backend;
pub mod config;
pub mod model;
pub mod render;
pub mod routes;
pub mod services;
pub mod state;
pub mod supabase;
