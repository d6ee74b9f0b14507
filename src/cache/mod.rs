//! Watched cache orchestration
//!
//! [`WatchedCache::get`] serves a resource from the [`CacheStore`] while it is
//! fresh. On a miss it reads the resource through the [`ResourceReader`],
//! subscribes to its next change and stores the content with a sliding
//! expiration. The change callback evicts the entry, so the next lookup reads
//! the resource again.
//!
//! Concurrent misses for the same resource join a single population flight:
//! the resource is read once and every waiter receives the same outcome.
//! Failures are returned to every joined caller and never cached.


use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::CACHE_LOOKUPS;
use crate::spawn_sweeper;
use crate::CacheNodeConfig;
use crate::CacheStore;
use crate::ChangeWatcher;
use crate::ReadError;
use crate::ResourceId;
use crate::ResourceReader;
use crate::ResourceSource;
use crate::Result;

/// Sliding expiration of the default configuration (`cache.sliding_expiration_ms`)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

type Flight = Shared<BoxFuture<'static, std::result::Result<Bytes, ReadError>>>;

struct Sweeper {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct CacheInner<S, W> {
    store: Arc<CacheStore>,
    reader: ResourceReader<S>,
    watcher: W,
    ttl: Duration,
    sweep_interval: Option<Duration>,
    in_flight: DashMap<ResourceId, Flight>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<S, W> Drop for CacheInner<S, W> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.token.cancel();
        }
    }
}

/// Cache of resource contents, invalidated by change notifications and by
/// sliding expiration.
///
/// Cloning is cheap; clones share the same entries.
pub struct WatchedCache<S, W> {
    inner: Arc<CacheInner<S, W>>,
}

impl<S, W> Clone for WatchedCache<S, W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, W> std::fmt::Debug for WatchedCache<S, W> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchedCache")
            .field("ttl", &self.inner.ttl)
            .field("entries", &self.inner.store.len())
            .field("in_flight", &self.inner.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<S, W> WatchedCache<S, W>
where
    S: ResourceSource,
    W: ChangeWatcher,
{
    /// Creates a cache whose entries expire `ttl` after their last access.
    ///
    /// The background sweeper is not started; see [`Self::start_sweeper`].
    pub fn new(
        reader: ResourceReader<S>,
        watcher: W,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: Arc::new(CacheStore::new()),
                reader,
                watcher,
                ttl,
                sweep_interval: None,
                in_flight: DashMap::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Creates a cache from validated configuration
    pub fn from_config(
        source: S,
        watcher: W,
        config: &CacheNodeConfig,
    ) -> Self {
        let reader = ResourceReader::new(source, config.retry.read);
        Self {
            inner: Arc::new(CacheInner {
                store: Arc::new(CacheStore::new()),
                reader,
                watcher,
                ttl: config.cache.sliding_expiration(),
                sweep_interval: config.cache.sweep_interval(),
                in_flight: DashMap::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Returns the content of `id`, reading it on a miss.
    ///
    /// Empty content is returned but not cached. Read failures are returned
    /// unchanged and leave nothing behind, so the next call reads again.
    pub async fn get(
        &self,
        id: impl Into<ResourceId>,
    ) -> Result<Bytes> {
        let id = id.into();

        if let Some(content) = self.inner.store.get(&id) {
            CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
            return Ok(content);
        }

        let flight = match self.inner.in_flight.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                CACHE_LOOKUPS.with_label_values(&["joined"]).inc();
                trace!(%id, "Joining population in flight");
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                // a flight may have completed since the first lookup
                if let Some(content) = self.inner.store.get(&id) {
                    CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                    return Ok(content);
                }
                CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                let flight = Self::start_flight(&self.inner, id.clone());
                vacant.insert(flight.clone());
                flight
            }
        };

        Ok(flight.await?)
    }

    /// Evicts `id` and unsubscribes its watch. Idempotent.
    pub fn invalidate(
        &self,
        id: impl Into<ResourceId>,
    ) -> bool {
        self.inner.store.invalidate(&id.into())
    }

    /// Whether `id` is cached, without refreshing its expiration
    pub fn contains(
        &self,
        id: impl Into<ResourceId>,
    ) -> bool {
        self.inner.store.contains(&id.into())
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Evicts every entry
    pub fn clear(&self) {
        self.inner.store.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn watcher(&self) -> &W {
        &self.inner.watcher
    }

    /// Starts the background sweeper with the configured interval.
    ///
    /// Does nothing when the sweeper is disabled or already running.
    /// Must be called within a tokio runtime.
    pub fn start_sweeper(&self) -> bool {
        match self.inner.sweep_interval {
            Some(interval) => self.start_sweeper_with(interval),
            None => false,
        }
    }

    /// Starts the background sweeper with an explicit interval
    pub fn start_sweeper_with(
        &self,
        interval: Duration,
    ) -> bool {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let task = spawn_sweeper(&self.inner.store, interval, token.clone());
        *sweeper = Some(Sweeper { token, task });
        info!(?interval, "Cache sweeper scheduled");
        true
    }

    /// Stops the background sweeper and waits for it to finish
    pub async fn stop_sweeper(&self) {
        let sweeper = self.inner.sweeper.lock().take();
        if let Some(Sweeper { token, task }) = sweeper {
            token.cancel();
            if let Err(e) = task.await {
                warn!("Cache sweeper ended abnormally: {:?}", e);
            }
        }
    }

    /// Spawns the population task and wraps it into a joinable flight.
    ///
    /// The task runs to completion even when every waiter goes away, and
    /// removes its own in-flight marker as soon as the read has finished.
    fn start_flight(
        inner: &Arc<CacheInner<S, W>>,
        id: ResourceId,
    ) -> Flight {
        let task = tokio::spawn(Self::populate(inner.clone(), id.clone()));

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(%id, "Population task failed: {:?}", e);
                    Err(ReadError::Aborted { id })
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn populate(
        inner: Arc<CacheInner<S, W>>,
        id: ResourceId,
    ) -> std::result::Result<Bytes, ReadError> {
        let outcome = inner.reader.read(&id).await;
        // released before the entry becomes visible: a change notified after
        // `put` must send the next miss to a fresh read, not to this flight
        inner.in_flight.remove(&id);

        let content = outcome?;
        Self::cache_content(&inner, &id, content.clone());
        Ok(content)
    }

    /// Watches `id` and caches `content` unless it is empty, unwatchable,
    /// or changed since it was read
    fn cache_content(
        inner: &Arc<CacheInner<S, W>>,
        id: &ResourceId,
        content: Bytes,
    ) {
        if content.is_empty() {
            debug!(%id, "Empty content is not cached");
            return;
        }

        let store = Arc::downgrade(&inner.store);
        let key = id.clone();
        let subscribed = inner.watcher.subscribe(
            id,
            Box::new(move || {
                if let Some(store) = store.upgrade() {
                    if store.invalidate(&key) {
                        debug!(id = %key, "Resource changed, entry evicted");
                    }
                }
            }),
        );

        match subscribed {
            Ok(watch) => {
                if !inner.store.put(id.clone(), content, inner.ttl, watch) {
                    debug!(%id, "Resource changed while populating, serving uncached");
                }
            }
            Err(error) => {
                warn!(%id, %error, "Cannot watch resource, serving uncached");
            }
        }
    }
}
