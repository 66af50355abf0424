use std::time::Duration;

use super::*;
use crate::transfer::memory::InMemoryStore;

fn quick() -> RetryPolicy {
    RetryPolicy {
        unit: Duration::from_millis(1),
        max_jitter: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

#[test]
fn status_classification() {
    assert_eq!(RemoteErrorKind::from_status(429), RemoteErrorKind::RateLimited);
    assert_eq!(RemoteErrorKind::from_status(401), RemoteErrorKind::Unauthorized);
    assert_eq!(RemoteErrorKind::from_status(503), RemoteErrorKind::Server(503));
    assert_eq!(RemoteErrorKind::from_status(404), RemoteErrorKind::Client(404));
    assert_eq!(RemoteErrorKind::from_status(302), RemoteErrorKind::Protocol);

    for k in [
        RemoteErrorKind::RateLimited,
        RemoteErrorKind::Server(500),
        RemoteErrorKind::Network,
        RemoteErrorKind::Unauthorized,
    ] {
        assert!(k.is_retryable(), "{k}");
    }
    assert!(!RemoteErrorKind::Client(400).is_retryable());
    assert!(!RemoteErrorKind::Protocol.is_retryable());
}

#[test]
fn content_range_headers() {
    let r = ChunkRange {
        start: 0,
        end: 5_242_879,
        total: 12_582_912,
    };
    assert_eq!(r.content_range(), "bytes 0-5242879/12582912");
    assert_eq!(r.len(), 5_242_880);

    let empty = ChunkRange {
        start: 0,
        end: 0,
        total: 0,
    };
    assert_eq!(empty.content_range(), "bytes */0");
    assert!(empty.is_empty());
}

#[test]
fn inverted_range_is_empty() {
    let past_end = ChunkRange {
        start: 1000,
        end: 999,
        total: 1000,
    };
    assert_eq!(past_end.len(), 0);
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn ensure_container_creates_once_then_finds() {
    let store = InMemoryStore::new();
    let p = quick();

    let root = ensure_container(&store, &p, "drop", None).await.unwrap();
    let again = ensure_container(&store, &p, "drop", None).await.unwrap();
    assert_eq!(root, again);

    let batch = ensure_container(&store, &p, "1-10", Some(&root)).await.unwrap();
    assert_ne!(batch, root);
    assert_eq!(store.container_id("1-10", Some(&root)), Some(batch));
    assert_eq!(store.container_count(), 2);
}

#[tokio::test]
async fn ensure_container_retries_transient_failures() {
    let store = InMemoryStore::new();
    store.fail_next_container_calls(vec![
        RemoteError::new(RemoteErrorKind::Server(500), "oops"),
        RemoteError::new(RemoteErrorKind::RateLimited, "slow"),
    ]);
    let id = ensure_container(&store, &quick(), "drop", None).await.unwrap();
    assert_eq!(store.container_id("drop", None), Some(id));
}
