use super::*;
use uuid::Uuid;

const BASE: &str = "https://abcd.supabase.co";

#[test]
fn list_url_filters_by_owner_newest_first() {
    let user = UserId(Uuid::from_u128(1));
    let url = table_url(BASE, &list_query(user)).unwrap();
    assert_eq!(
        url,
        "https://abcd.supabase.co/rest/v1/bookmarks?select=*&user_id=eq.00000000-0000-0000-0000-000000000001&order=created_at.desc"
    );
}

#[test]
fn insert_url_has_no_query() {
    assert_eq!(table_url(BASE, &[]).unwrap(), "https://abcd.supabase.co/rest/v1/bookmarks");
}

#[test]
fn delete_url_encodes_the_id() {
    let url = table_url(BASE, &delete_query(&BookmarkId::new("a b&c"))).unwrap();
    assert_eq!(url, "https://abcd.supabase.co/rest/v1/bookmarks?id=eq.a+b%26c");
}

#[test]
fn parse_rows_accepts_integer_and_text_ids() {
    let body = r#"[
        {"id": 12, "user_id": "00000000-0000-0000-0000-000000000001", "title": "Rust",
         "url": "https://rust-lang.org", "created_at": "2026-01-02T03:04:05.123456+00:00"},
        {"id": "b7c4", "user_id": "00000000-0000-0000-0000-000000000001", "title": "Docs",
         "url": "https://docs.rs", "created_at": "2026-01-01T00:00:00Z"}
    ]"#;
    let rows = parse_rows(body).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id.as_str(), "12");
    assert_eq!(rows[1].id.as_str(), "b7c4");
    assert_eq!(rows[0].title, "Rust");
}

#[test]
fn parse_rows_rejects_row_without_owner() {
    let body = r#"[{"id": 1, "title": "x", "url": "y", "created_at": "2026-01-01T00:00:00Z"}]"#;
    let err = parse_rows(body).unwrap_err();
    assert!(matches!(err, BackendError::Parse(_)));
}

#[test]
fn new_bookmark_serializes_as_insert_body() {
    let body = serde_json::to_value(NewBookmark {
        title: "Rust".into(),
        url: "https://rust-lang.org".into(),
        user_id: UserId(Uuid::from_u128(1)),
    })
    .unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "title": "Rust",
            "url": "https://rust-lang.org",
            "user_id": "00000000-0000-0000-0000-000000000001",
        })
    );
}
