use std::time::Duration;

use bytes::Bytes;
use watched_cache::Error;
use watched_cache::ReadError;

use crate::commons::eventually;
use crate::commons::setup_cache;
use crate::commons::write_file;

const POLL_INTERVAL_MS: u64 = 100;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_detects_modification() {
    let (dir, cache) = setup_cache(POLL_INTERVAL_MS);
    let cache = &cache;
    write_file(dir.path(), "test.txt", "first").await;

    assert_eq!(cache.get("test.txt").await.unwrap(), Bytes::from("first"));

    write_file(dir.path(), "test.txt", "second, longer").await;

    let refreshed = eventually(|| async move {
        matches!(cache.get("test.txt").await, Ok(c) if c == Bytes::from("second, longer"))
    })
    .await;
    assert!(refreshed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_detects_same_size_rewrite_within_a_second() {
    let (dir, cache) = setup_cache(POLL_INTERVAL_MS);
    let cache = &cache;
    write_file(dir.path(), "test.txt", "aaaa").await;

    // let the watcher take its baseline, then rewrite before the mtime
    // second can change
    assert_eq!(cache.get("test.txt").await.unwrap(), Bytes::from("aaaa"));
    tokio::time::sleep(Duration::from_millis(2 * POLL_INTERVAL_MS)).await;
    write_file(dir.path(), "test.txt", "bbbb").await;

    let refreshed = eventually(|| async move {
        matches!(cache.get("test.txt").await, Ok(c) if c == Bytes::from("bbbb"))
    })
    .await;
    assert!(refreshed, "same-second rewrite was never reported");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_notifies_every_alias_of_a_file() {
    let (dir, cache) = setup_cache(POLL_INTERVAL_MS);
    let cache = &cache;
    write_file(dir.path(), "a.txt", "first").await;

    assert_eq!(cache.get("a.txt").await.unwrap(), Bytes::from("first"));
    assert_eq!(cache.get("./a.txt").await.unwrap(), Bytes::from("first"));

    write_file(dir.path(), "a.txt", "second").await;

    for id in ["a.txt", "./a.txt"] {
        let refreshed = eventually(|| async move {
            matches!(cache.get(id).await, Ok(c) if c == Bytes::from("second"))
        })
        .await;
        assert!(refreshed, "{id} kept serving stale content");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_detects_removal() {
    let (dir, cache) = setup_cache(POLL_INTERVAL_MS);
    let cache = &cache;
    write_file(dir.path(), "test.txt", "content").await;

    cache.get("test.txt").await.unwrap();
    tokio::fs::remove_file(dir.path().join("test.txt")).await.unwrap();

    assert!(eventually(|| async move { !cache.contains("test.txt") }).await);
    assert!(matches!(
        cache.get("test.txt").await,
        Err(Error::Read(ReadError::NotFound { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ids_outside_the_root_are_not_found() {
    let (_dir, cache) = setup_cache(POLL_INTERVAL_MS);

    for id in ["../etc/passwd", "/etc/passwd", ""] {
        assert!(matches!(cache.get(id).await, Err(Error::Read(ReadError::NotFound { .. }))));
    }
    assert!(cache.is_empty());
}
