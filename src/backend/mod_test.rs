use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counted_subscription() -> (Subscription<u32>, mpsc::UnboundedSender<u32>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let sub = Subscription::new(rx, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (sub, tx, released)
}

#[tokio::test]
async fn subscription_yields_sent_items() {
    let (mut sub, tx, _) = counted_subscription();
    tx.send(7).unwrap();
    assert_eq!(sub.recv().await, Some(7));
}

#[test]
fn unsubscribe_releases_exactly_once() {
    let (sub, _tx, released) = counted_subscription();
    sub.unsubscribe();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_releases_registration() {
    let (sub, _tx, released) = counted_subscription();
    drop(sub);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_closes_channel_for_senders() {
    let (sub, tx, _) = counted_subscription();
    sub.unsubscribe();
    assert!(tx.send(1).is_err());
}

#[test]
fn user_message_prefers_backend_wording() {
    let err = BackendError::QueryFailed { message: "duplicate url".into(), code: Some("23505".into()) };
    assert_eq!(err.user_message(), "duplicate url");
    assert_eq!(err.to_string(), "query failed: duplicate url");

    let err = BackendError::NotAuthenticated;
    assert_eq!(err.user_message(), "not signed in");
}

#[tokio::test]
async fn into_parts_keeps_registration_until_guard_released() {
    let (sub, tx, released) = counted_subscription();
    let (mut rx, guard) = sub.into_parts();
    tx.send(3).unwrap();
    assert_eq!(rx.recv().await, Some(3));
    assert_eq!(released.load(Ordering::SeqCst), 0);
    guard.release();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
