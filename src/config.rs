//! Runtime configuration: platform endpoint, key and client tuning.
//!
//! The two required values (project URL and anon key) come from flags or
//! environment via clap in `main`; tuning knobs are read from the environment
//! with defaults.

use std::path::PathBuf;

use crate::model::{OAuthProvider, UnknownProvider};

pub const DEFAULT_CALLBACK_PORT: u16 = 3000;
pub const DEFAULT_SESSION_FILE: &str = ".smart-bookmarks-session.json";
pub const DEFAULT_REALTIME_HEARTBEAT_SECS: u64 = 25;
pub const DEFAULT_SESSION_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid supabase url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Provider(#[from] UnknownProvider),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Project base URL without a trailing slash.
    pub supabase_url: String,
    pub anon_key: String,
    pub provider: OAuthProvider,
    /// Loopback port the OAuth callback listener binds.
    pub callback_port: u16,
    pub session_file: PathBuf,
    pub heartbeat_secs: u64,
    /// Sessions this close to expiry are refreshed before use.
    pub refresh_margin_secs: i64,
}

impl Config {
    /// Validate the required values and fill the rest from defaults and
    /// environment.
    ///
    /// Optional env:
    /// - `REALTIME_HEARTBEAT_SECS`: default 25
    /// - `SESSION_REFRESH_MARGIN_SECS`: default 60
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s), the key is empty, or the
    /// provider is unknown.
    pub fn new(supabase_url: &str, anon_key: &str, provider: &str) -> Result<Self, ConfigError> {
        let supabase_url = supabase_url.trim().trim_end_matches('/').to_owned();
        if supabase_url.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_URL"));
        }
        let parsed = reqwest::Url::parse(&supabase_url).map_err(|e| ConfigError::InvalidUrl(format!("{supabase_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!("{supabase_url}: scheme must be http or https")));
        }

        let anon_key = anon_key.trim().to_owned();
        if anon_key.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_ANON_KEY"));
        }

        Ok(Self {
            supabase_url,
            anon_key,
            provider: provider.parse()?,
            callback_port: DEFAULT_CALLBACK_PORT,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            heartbeat_secs: env_parse("REALTIME_HEARTBEAT_SECS", DEFAULT_REALTIME_HEARTBEAT_SECS),
            refresh_margin_secs: env_parse("SESSION_REFRESH_MARGIN_SECS", DEFAULT_SESSION_REFRESH_MARGIN_SECS),
        })
    }

    #[must_use]
    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }
}

#[must_use]
pub fn callback_url(port: u16) -> String {
    format!("http://localhost:{port}/auth/callback")
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
