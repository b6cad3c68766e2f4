use super::*;
use crate::model::{BookmarkId, UserId};
use time::macros::datetime;
use uuid::Uuid;

fn bookmark(id: &str, at: time::OffsetDateTime) -> Bookmark {
    Bookmark {
        id: BookmarkId::new(id),
        user_id: UserId(Uuid::nil()),
        title: id.into(),
        url: format!("https://{id}.example"),
        created_at: at,
    }
}

#[test]
fn default_state_is_loading_and_inactive() {
    let view = SharedView::new();
    assert_eq!(view.screen(), Screen::Loading);
    assert_eq!(view.read(|s| s.sync), SyncState::Inactive);
}

#[test]
fn replace_bookmarks_sorts_and_overwrites() {
    let mut state = ViewState::default();
    state.replace_bookmarks(vec![bookmark("old", datetime!(2024-01-01 0:00 UTC))]);
    state.replace_bookmarks(vec![
        bookmark("t1", datetime!(2024-01-01 0:00 UTC)),
        bookmark("t2", datetime!(2024-06-01 0:00 UTC)),
    ]);
    let ids: Vec<_> = state.bookmarks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["t2", "t1"]);
}

#[test]
fn update_bumps_version() {
    let view = SharedView::new();
    let before = view.read(|s| s.version);
    view.set_title("Rust");
    assert_eq!(view.read(|s| s.version), before + 1);
    assert_eq!(view.read(|s| s.title_input.clone()), "Rust");
}

#[test]
fn show_login_drops_session_data() {
    let view = SharedView::new();
    view.show_main("a@example.com".into());
    view.set_title("keep?");
    view.update(|s| s.replace_bookmarks(vec![bookmark("b", datetime!(2024-01-01 0:00 UTC))]));

    view.show_login();

    let state = view.read(ViewState::clone);
    assert_eq!(state.screen, Screen::Login);
    assert!(state.account.is_none());
    assert!(state.bookmarks.is_empty());
    assert!(state.title_input.is_empty());
}

#[test]
fn show_main_resets_login_view() {
    let view = SharedView::new();
    view.set_login_error(Some("boom".into()));
    view.show_main("me".into());
    assert_eq!(view.read(|s| s.login.clone()), LoginView::default());
}

#[test]
fn alerts_are_drained_once() {
    let view = SharedView::new();
    view.alert("Failed to delete: nope");
    assert_eq!(view.take_alerts(), vec!["Failed to delete: nope".to_owned()]);
    assert!(view.take_alerts().is_empty());
}

#[tokio::test]
async fn changed_resolves_after_update() {
    let view = SharedView::new();
    view.set_url("https://x.com");
    tokio::time::timeout(std::time::Duration::from_millis(100), view.changed())
        .await
        .expect("update should signal the render loop");
}
