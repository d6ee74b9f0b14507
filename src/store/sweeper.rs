use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CacheStore;

/// Periodically evicts idle entries from `store`.
///
/// The task holds the store weakly and ends when the store is dropped or the
/// token is cancelled. Must be called within a tokio runtime.
pub fn spawn_sweeper(
    store: &Arc<CacheStore>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let store: Weak<CacheStore> = Arc::downgrade(store);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        debug!(?interval, "Cache sweeper started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(store) = store.upgrade() else {
                        break;
                    };
                    store.sweep(Instant::now());
                }
            }
        }
        debug!("Cache sweeper stopped");
    })
}
