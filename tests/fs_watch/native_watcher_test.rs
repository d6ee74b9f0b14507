use bytes::Bytes;
use watched_cache::Error;
use watched_cache::ReadError;

use crate::commons::eventually;
use crate::commons::setup_cache;
use crate::commons::write_file;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_modified_file_is_read_again() {
    let (dir, cache) = setup_cache(0);
    let cache = &cache;
    write_file(dir.path(), "appsettings.toml", "version = 1").await;

    assert_eq!(cache.get("appsettings.toml").await.unwrap(), Bytes::from("version = 1"));
    assert!(cache.contains("appsettings.toml"));

    write_file(dir.path(), "appsettings.toml", "version = 2").await;

    let refreshed = eventually(|| async move {
        matches!(cache.get("appsettings.toml").await, Ok(c) if c == Bytes::from("version = 2"))
    })
    .await;
    assert!(refreshed, "cache never observed the new content");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_file_becomes_not_found() {
    let (dir, cache) = setup_cache(0);
    let cache = &cache;
    write_file(dir.path(), "gone.txt", "here").await;

    assert_eq!(cache.get("gone.txt").await.unwrap(), Bytes::from("here"));

    tokio::fs::remove_file(dir.path().join("gone.txt")).await.unwrap();

    let missing = eventually(|| async move {
        matches!(cache.get("gone.txt").await, Err(Error::Read(ReadError::NotFound { .. })))
    })
    .await;
    assert!(missing, "deleted file is still served");
    assert!(!cache.contains("gone.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nested_resource_is_watched() {
    let (dir, cache) = setup_cache(0);
    let cache = &cache;
    tokio::fs::create_dir_all(dir.path().join("views/shared")).await.unwrap();
    write_file(dir.path(), "views/shared/layout.html", "<main/>").await;

    assert_eq!(cache.get("views/shared/layout.html").await.unwrap(), Bytes::from("<main/>"));

    write_file(dir.path(), "views/shared/layout.html", "<main>v2</main>").await;

    let refreshed = eventually(|| async move {
        matches!(cache.get("views/shared/layout.html").await, Ok(c) if c == Bytes::from("<main>v2</main>"))
    })
    .await;
    assert!(refreshed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sibling_change_keeps_entry() {
    let (dir, cache) = setup_cache(0);
    let cache = &cache;
    write_file(dir.path(), "a.txt", "a").await;
    write_file(dir.path(), "b.txt", "b").await;

    cache.get("a.txt").await.unwrap();
    cache.get("b.txt").await.unwrap();

    write_file(dir.path(), "b.txt", "b2").await;
    assert!(eventually(|| async move { !cache.contains("b.txt") }).await);

    assert!(cache.contains("a.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_alias_of_a_file_is_notified() {
    let (dir, cache) = setup_cache(0);
    let cache = &cache;
    write_file(dir.path(), "a.txt", "first").await;

    assert_eq!(cache.get("a.txt").await.unwrap(), Bytes::from("first"));
    assert_eq!(cache.get("./a.txt").await.unwrap(), Bytes::from("first"));
    assert_eq!(cache.len(), 2);

    write_file(dir.path(), "a.txt", "second").await;

    let both_evicted =
        eventually(|| async move { !cache.contains("a.txt") && !cache.contains("./a.txt") }).await;
    assert!(both_evicted, "an alias kept its stale entry");
    assert_eq!(cache.get("./a.txt").await.unwrap(), Bytes::from("second"));
}
