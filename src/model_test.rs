use super::*;
use serde_json::json;
use time::macros::datetime;

fn user() -> UserId {
    "7d3f4a52-1c1b-4c34-9a43-0d1f3f1d9b10".parse().unwrap()
}

// =============================================================================
// Bookmark wire format
// =============================================================================

#[test]
fn bookmark_deserializes_postgrest_row() {
    let row = json!({
        "id": "b1",
        "user_id": "7d3f4a52-1c1b-4c34-9a43-0d1f3f1d9b10",
        "title": "Rust",
        "url": "https://www.rust-lang.org",
        "created_at": "2024-05-01T10:00:00.123456+00:00"
    });
    let bookmark: Bookmark = serde_json::from_value(row).unwrap();
    assert_eq!(bookmark.id.as_str(), "b1");
    assert_eq!(bookmark.user_id, user());
    assert_eq!(bookmark.created_at.year(), 2024);
}

#[test]
fn bookmark_accepts_integer_id() {
    let row = json!({
        "id": 42,
        "user_id": "7d3f4a52-1c1b-4c34-9a43-0d1f3f1d9b10",
        "title": "Docs",
        "url": "https://docs.rs",
        "created_at": "2024-05-01T10:00:00Z"
    });
    let bookmark: Bookmark = serde_json::from_value(row).unwrap();
    assert_eq!(bookmark.id, BookmarkId::new("42"));
}

#[test]
fn bookmark_missing_owner_is_rejected() {
    let row = json!({
        "id": "b1",
        "title": "Rust",
        "url": "https://www.rust-lang.org",
        "created_at": "2024-05-01T10:00:00Z"
    });
    let err = serde_json::from_value::<Bookmark>(row).unwrap_err();
    assert!(err.to_string().contains("user_id"));
}

#[test]
fn bookmark_missing_created_at_is_rejected() {
    let row = json!({
        "id": "b1",
        "user_id": "7d3f4a52-1c1b-4c34-9a43-0d1f3f1d9b10",
        "title": "Rust",
        "url": "https://www.rust-lang.org"
    });
    assert!(serde_json::from_value::<Bookmark>(row).is_err());
}

#[test]
fn new_bookmark_serializes_insert_columns() {
    let insert = NewBookmark { title: "T".into(), url: "https://x.com".into(), user_id: user() };
    let value = serde_json::to_value(&insert).unwrap();
    assert_eq!(value["title"], "T");
    assert_eq!(value["url"], "https://x.com");
    assert_eq!(value["user_id"], "7d3f4a52-1c1b-4c34-9a43-0d1f3f1d9b10");
    assert!(value.get("id").is_none());
}

#[test]
fn sort_newest_first_orders_descending() {
    let mk = |id: &str, at| Bookmark {
        id: BookmarkId::new(id),
        user_id: user(),
        title: id.into(),
        url: format!("https://{id}.example"),
        created_at: at,
    };
    let mut list = vec![
        mk("t1", datetime!(2024-01-01 0:00 UTC)),
        mk("t3", datetime!(2024-03-01 0:00 UTC)),
        mk("t2", datetime!(2024-02-01 0:00 UTC)),
    ];
    sort_newest_first(&mut list);
    let ids: Vec<_> = list.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["t3", "t2", "t1"]);
}

// =============================================================================
// Session
// =============================================================================

fn session(expires_at: Option<i64>) -> Session {
    Session {
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at,
        user: SessionUser { id: user(), email: Some("a@example.com".into()) },
    }
}

#[test]
fn session_expires_within_margin() {
    let s = session(Some(1_000));
    assert!(s.expires_within(950, 60));
    assert!(!s.expires_within(900, 60));
    assert!(s.expires_within(2_000, 0));
}

#[test]
fn session_without_expiry_never_expires() {
    assert!(!session(None).expires_within(i64::MAX - 1, 60));
}

#[test]
fn session_missing_user_id_is_rejected() {
    let raw = json!({
        "access_token": "at",
        "refresh_token": "rt",
        "user": { "email": "a@example.com" }
    });
    assert!(serde_json::from_value::<Session>(raw).is_err());
}

// =============================================================================
// Provider and change kinds
// =============================================================================

#[test]
fn provider_parses_case_insensitively() {
    assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
    assert_eq!(" github ".parse::<OAuthProvider>().unwrap(), OAuthProvider::GitHub);
    assert!("myspace".parse::<OAuthProvider>().is_err());
}

#[test]
fn provider_display_name_for_button() {
    assert_eq!(OAuthProvider::Google.display_name(), "Google");
    assert_eq!(OAuthProvider::Google.to_string(), "google");
}

#[test]
fn change_kind_from_wire() {
    assert_eq!(ChangeKind::from_wire("INSERT"), Some(ChangeKind::Insert));
    assert_eq!(ChangeKind::from_wire("update"), Some(ChangeKind::Update));
    assert_eq!(ChangeKind::from_wire("DELETE"), Some(ChangeKind::Delete));
    assert_eq!(ChangeKind::from_wire("TRUNCATE"), None);
}

#[test]
fn change_filter_all_matches_every_kind() {
    let filter = ChangeFilter::default();
    assert_eq!(filter.as_wire(), "*");
    assert!(filter.matches(ChangeKind::Insert));
    assert!(filter.matches(ChangeKind::Delete));

    let only = ChangeFilter::Only(ChangeKind::Delete);
    assert_eq!(only.as_wire(), "DELETE");
    assert!(!only.matches(ChangeKind::Insert));
}
