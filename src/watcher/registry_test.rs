//! Unit tests for the watch system
//!
//! - one-shot delivery
//! - cancellation without callback
//! - resource isolation
//! - re-arming through ChangeLoop

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_test::traced_test;

use super::*;

fn counting_callback(counter: &Arc<AtomicUsize>) -> ChangeCallback {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_register_single_subscription() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("test.txt");

    let handle = registry.register(&key, Box::new(|| {})).unwrap();

    assert_eq!(registry.subscription_count(&key), 1);
    assert_eq!(registry.watched_resource_count(), 1);
    assert_eq!(handle.resource(), &key);
    assert!(!handle.has_fired());
}

#[test]
fn test_notification_fires_exactly_once() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("test.txt");
    let fired = Arc::new(AtomicUsize::new(0));

    let handle = registry.register(&key, counting_callback(&fired)).unwrap();

    assert_eq!(registry.notify_changed(&key), 1);
    assert_eq!(registry.notify_changed(&key), 0);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(handle.has_fired());
    assert_eq!(registry.subscription_count(&key), 0);
}

#[test]
fn test_cancel_before_fire_delivers_nothing() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("test.txt");
    let fired = Arc::new(AtomicUsize::new(0));

    let handle = registry.register(&key, counting_callback(&fired)).unwrap();
    registry.unsubscribe(handle);

    assert_eq!(registry.subscription_count(&key), 0);
    assert_eq!(registry.watched_resource_count(), 0);
    assert_eq!(registry.notify_changed(&key), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_unregisters_only_own_subscription() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("shared.txt");
    let fired = Arc::new(AtomicUsize::new(0));

    let first = registry.register(&key, counting_callback(&fired)).unwrap();
    let _second = registry.register(&key, counting_callback(&fired)).unwrap();
    assert_eq!(registry.subscription_count(&key), 2);

    drop(first);
    assert_eq!(registry.subscription_count(&key), 1);

    registry.notify_changed(&key);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resources_are_isolated() {
    let registry = WatchRegistry::new();
    let a = ResourceId::from("a.txt");
    let b = ResourceId::from("b.txt");
    let fired_a = Arc::new(AtomicUsize::new(0));
    let fired_b = Arc::new(AtomicUsize::new(0));

    let _ha = registry.register(&a, counting_callback(&fired_a)).unwrap();
    let _hb = registry.register(&b, counting_callback(&fired_b)).unwrap();

    registry.notify_changed(&a);

    assert_eq!(fired_a.load(Ordering::SeqCst), 1);
    assert_eq!(fired_b.load(Ordering::SeqCst), 0);
    assert_eq!(registry.subscription_count(&b), 1);
}

#[test]
fn test_callback_may_drop_its_own_handle() {
    // cache entries own their handle and are evicted from inside the callback
    let registry = WatchRegistry::new();
    let key = ResourceId::from("test.txt");
    let slot: Arc<parking_lot::Mutex<Option<WatchHandle>>> = Arc::new(parking_lot::Mutex::new(None));

    let slot_clone = slot.clone();
    let handle = registry
        .register(
            &key,
            Box::new(move || {
                slot_clone.lock().take();
            }),
        )
        .unwrap();
    *slot.lock() = Some(handle);

    assert_eq!(registry.notify_changed(&key), 1);
    assert!(slot.lock().is_none());
}

#[test]
fn test_close_fires_pending_and_rejects_new() {
    let registry = WatchRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let _h1 = registry.register(&ResourceId::from("a"), counting_callback(&fired)).unwrap();
    let _h2 = registry.register(&ResourceId::from("b"), counting_callback(&fired)).unwrap();

    assert_eq!(registry.close(), 2);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert!(registry.is_closed());

    let result = registry.register(&ResourceId::from("c"), Box::new(|| {}));
    assert!(matches!(result, Err(WatchError::Closed)));
}

#[tokio::test]
async fn test_change_loop_rearms_after_each_notification() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("appsettings.toml");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let change_loop = ChangeLoop::start(registry.clone(), key.clone(), move |id| {
        let _ = tx.send(id.clone());
    });

    for _ in 0..3 {
        // wait until the loop has (re-)subscribed
        timeout(Duration::from_secs(5), async {
            while registry.subscription_count(&key) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("loop subscribed");

        registry.notify_changed(&key);
        let id = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(id, key);
    }

    change_loop.stop().await;
    assert_eq!(registry.subscription_count(&key), 0);
}

#[tokio::test]
async fn test_change_loop_stops_when_registry_closes() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("appsettings.toml");
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = calls.clone();
    let change_loop = ChangeLoop::start(registry.clone(), key.clone(), move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    timeout(Duration::from_secs(5), async {
        while registry.subscription_count(&key) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop subscribed");

    registry.close();

    // the close itself counts as a change
    timeout(Duration::from_secs(5), async {
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer invoked");

    // re-subscribing fails on a closed registry, so the loop ends by itself
    timeout(Duration::from_secs(5), change_loop.stop()).await.expect("loop exits");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[traced_test]
async fn test_change_loop_reports_panicking_consumer_on_stop() {
    let registry = WatchRegistry::new();
    let key = ResourceId::from("appsettings.toml");
    let entered = Arc::new(AtomicBool::new(false));

    let entered_clone = entered.clone();
    let change_loop = ChangeLoop::start(registry.clone(), key.clone(), move |_| {
        entered_clone.store(true, Ordering::SeqCst);
        panic!("consumer failed");
    });

    timeout(Duration::from_secs(5), async {
        while registry.subscription_count(&key) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop subscribed");

    registry.notify_changed(&key);
    timeout(Duration::from_secs(5), async {
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer invoked");

    change_loop.stop().await;
    assert!(logs_contain("Change loop ended abnormally"));
}
