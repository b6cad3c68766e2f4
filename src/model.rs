//! Domain types shared by the session gate, the sync controller and backends.
//!
//! DESIGN
//! ======
//! Wire records deserialize straight into these structs. Required fields are
//! not `Option`, so a record missing `user_id` or `created_at` is rejected at
//! the boundary instead of surfacing later as an empty value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque bookmark identifier. The backend may hand out text or integer keys;
/// both are kept in their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BookmarkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Int(n) => Self(n.to_string()),
        })
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// The identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as unix seconds, when the provider reported one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

impl Session {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// True when the session expires within `margin_secs` of `now_unix`.
    /// Sessions without an expiry never report as expiring.
    #[must_use]
    pub fn expires_within(&self, now_unix: i64, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - now_unix <= margin_secs)
    }
}

/// Kind of session-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session-change notification: the event and the session after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// OAuth identity providers the sign-in flow can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OAuthProvider {
    #[default]
    Google,
    GitHub,
    GitLab,
    Azure,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown oauth provider: {0}")]
pub struct UnknownProvider(pub String);

impl OAuthProvider {
    /// Provider slug used in the authorize URL.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Azure => "azure",
        }
    }

    /// Human-facing name, as shown on the sign-in button.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
            Self::Azure => "Azure",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "azure" => Ok(Self::Azure),
            other => Err(UnknownProvider(other.to_owned())),
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BOOKMARK
// =============================================================================

/// A stored bookmark. Mirrors the `bookmarks` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub user_id: UserId,
    pub title: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for a new bookmark. `id` and `created_at` are assigned by
/// the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: UserId,
}

/// Order bookmarks newest first. Stable, so equal timestamps keep backend order.
pub fn sort_newest_first(bookmarks: &mut [Bookmark]) {
    bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// =============================================================================
// CHANGE NOTIFICATIONS
// =============================================================================

/// Row-level change kind reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse the feed's `type` field (`INSERT`, `UPDATE`, `DELETE`).
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Which change kinds a subscription asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl ChangeFilter {
    /// Event selector sent when joining the change feed.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Only(kind) => kind.as_wire(),
        }
    }

    #[must_use]
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == kind,
        }
    }
}

/// A change notification. The payload is carried for logging only; consumers
/// treat the event as a refetch trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
