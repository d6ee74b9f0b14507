use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::WatchHandle;

/// Cached value with its sliding-expiration bookkeeping.
///
/// Owned by [`super::CacheStore`] only; dropping the entry unsubscribes its watch.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) value: Bytes,
    last_access: Instant,
    ttl: Duration,
    _watch: WatchHandle,
}

impl CacheEntry {
    pub(crate) fn new(
        value: Bytes,
        ttl: Duration,
        watch: WatchHandle,
        now: Instant,
    ) -> Self {
        Self {
            value,
            last_access: now,
            ttl,
            _watch: watch,
        }
    }

    /// Expiration is measured from the last access, not from insertion
    pub(crate) fn is_expired(
        &self,
        now: Instant,
    ) -> bool {
        now.saturating_duration_since(self.last_access) > self.ttl
    }

    pub(crate) fn touch(
        &mut self,
        now: Instant,
    ) {
        self.last_access = now;
    }
}
