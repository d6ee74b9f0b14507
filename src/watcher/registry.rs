//! One-shot change subscriptions keyed by resource
//!
//! ```text
//! notify_changed(id) -> remove subscriptions of id from DashMap
//!                            ↓ (outside the shard lock)
//!                       mark fired -> run callback (once)
//! ```
//!
//! A [`WatchHandle`] unregisters its subscription when dropped, so an entry
//! evicted from the cache never leaves a live callback behind.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::ChangeCallback;
use super::ChangeWatcher;
use crate::metrics::WATCH_SUBSCRIPTIONS;
use crate::ResourceId;
use crate::WatchError;

/// Internal subscription state
struct Subscription {
    /// Unique identifier
    id: u64,
    /// Shared with the handle so the owner can tell a consumed subscription apart
    fired: Arc<AtomicBool>,
    /// Callbacks are only `Send`; the mutex keeps the registry `Sync`
    callback: Mutex<ChangeCallback>,
}

impl Subscription {
    fn fire(self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            (self.callback.into_inner())();
        }
    }
}

struct WatchRegistryInner {
    /// Subscriptions grouped by resource
    subscriptions: DashMap<ResourceId, Vec<Subscription>>,

    /// Next subscription ID (monotonically increasing)
    next_id: AtomicU64,

    /// Set once the registry stops accepting subscriptions
    closed: AtomicBool,
}

impl std::fmt::Debug for WatchRegistryInner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchRegistryInner")
            .field("watched_resources", &self.subscriptions.len())
            .field("next_id", &self.next_id)
            .field("closed", &self.closed)
            .finish()
    }
}

/// In-memory push notification source.
///
/// Anything that learns about resource changes (a filesystem watcher, a
/// message bus consumer, a test) reports them through
/// [`WatchRegistry::notify_changed`].
#[derive(Debug, Clone)]
pub struct WatchRegistry {
    inner: Arc<WatchRegistryInner>,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WatchRegistryInner {
                subscriptions: DashMap::new(),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a one-shot callback for `resource`
    pub fn register(
        &self,
        resource: &ResourceId,
        on_change: ChangeCallback,
    ) -> Result<WatchHandle, WatchError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WatchError::Closed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let fired = Arc::new(AtomicBool::new(false));

        self.inner.subscriptions.entry(resource.clone()).or_default().push(Subscription {
            id,
            fired: fired.clone(),
            callback: Mutex::new(on_change),
        });
        WATCH_SUBSCRIPTIONS.inc();

        trace!(subscription_id = id, %resource, "Subscription registered");

        Ok(WatchHandle {
            id,
            resource: resource.clone(),
            fired,
            registry: Some(self.inner.clone()),
        })
    }

    /// Fires and consumes every subscription of `resource`.
    ///
    /// Returns the number of callbacks delivered.
    pub fn notify_changed(
        &self,
        resource: &ResourceId,
    ) -> usize {
        let Some((_, subscriptions)) = self.inner.subscriptions.remove(resource) else {
            return 0;
        };

        let count = subscriptions.len();
        WATCH_SUBSCRIPTIONS.sub(count as i64);
        for subscription in subscriptions {
            subscription.fire();
        }

        debug!(%resource, fired = count, "Change notified");
        count
    }

    /// Fires every subscription of every resource.
    pub fn notify_all(&self) -> usize {
        let resources: Vec<ResourceId> =
            self.inner.subscriptions.iter().map(|e| e.key().clone()).collect();

        resources.iter().map(|resource| self.notify_changed(resource)).sum()
    }

    /// Stops accepting subscriptions and fires the pending ones: once nothing
    /// watches a resource anymore its cached value can no longer be trusted.
    pub fn close(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        self.notify_all()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions on `resource`
    pub fn subscription_count(
        &self,
        resource: &ResourceId,
    ) -> usize {
        self.inner.subscriptions.get(resource).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of resources with at least one live subscription
    pub fn watched_resource_count(&self) -> usize {
        self.inner.subscriptions.len()
    }
}

impl ChangeWatcher for WatchRegistry {
    fn subscribe(
        &self,
        resource: &ResourceId,
        on_change: ChangeCallback,
    ) -> Result<WatchHandle, WatchError> {
        self.register(resource, on_change)
    }
}

/// Handle for a registered subscription
///
/// When dropped, the subscription is unregistered without firing.
pub struct WatchHandle {
    id: u64,
    resource: ResourceId,
    fired: Arc<AtomicBool>,
    /// None once unregistered
    registry: Option<Arc<WatchRegistryInner>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("fired", &self.has_fired())
            .finish()
    }
}

impl WatchHandle {
    /// Get the unique identifier for this subscription
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the resource being watched
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Whether the change notification has already been delivered
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Unsubscribes; no callback is delivered afterwards
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let Some(registry) = self.registry.take() else {
            return;
        };
        if self.has_fired() {
            return;
        }

        let mut removed = 0;
        registry.subscriptions.remove_if_mut(&self.resource, |_key, subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.id != self.id);
            removed = before - subscriptions.len();
            subscriptions.is_empty()
        });

        if removed > 0 {
            WATCH_SUBSCRIPTIONS.sub(removed as i64);
            trace!(subscription_id = self.id, resource = %self.resource, "Subscription cancelled");
        }
    }
}
