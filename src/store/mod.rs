//! Concurrency-safe storage of cached values
//!
//! Every operation is atomic per resource (one DashMap shard lock). Evicted
//! entries are always dropped after the shard lock is released, because
//! dropping an entry unsubscribes its watch.
mod entry;
mod sweeper;
pub(crate) use entry::*;
pub use sweeper::*;


use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::metrics::CACHE_EVICTIONS;
use crate::ResourceId;
use crate::WatchHandle;

#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<ResourceId, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value and refreshes its last access time.
    ///
    /// An entry found expired is evicted on the spot and reported as a miss.
    pub fn get(
        &self,
        id: &ResourceId,
    ) -> Option<Bytes> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(id) {
            Some(mut entry) => {
                if !entry.is_expired(now) {
                    entry.touch(now);
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            let evicted = self.entries.remove_if(id, |_, entry| entry.is_expired(now));
            if evicted.is_some() {
                CACHE_EVICTIONS.with_label_values(&["expired"]).inc();
                trace!(%id, "Expired entry evicted on access");
            }
        }
        None
    }

    /// Inserts or replaces the entry for `id`.
    ///
    /// A replaced entry's watch is unsubscribed. Returns `false` without
    /// storing anything when `watch` has already fired: the resource changed
    /// after `value` was read.
    pub fn put(
        &self,
        id: ResourceId,
        value: Bytes,
        ttl: Duration,
        watch: WatchHandle,
    ) -> bool {
        let now = Instant::now();

        // the fired check must happen under the shard lock: a firing watch
        // invalidates through the same lock right after setting the flag
        let previous = match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                if watch.has_fired() {
                    return false;
                }
                Some(occupied.insert(CacheEntry::new(value, ttl, watch, now)))
            }
            Entry::Vacant(vacant) => {
                if watch.has_fired() {
                    return false;
                }
                vacant.insert(CacheEntry::new(value, ttl, watch, now));
                None
            }
        };

        if let Some(previous) = previous {
            CACHE_EVICTIONS.with_label_values(&["replaced"]).inc();
            drop(previous);
        }
        true
    }

    /// Removes the entry for `id` and unsubscribes its watch.
    ///
    /// Idempotent; returns whether an entry was removed.
    pub fn invalidate(
        &self,
        id: &ResourceId,
    ) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                drop(entry);
                CACHE_EVICTIONS.with_label_values(&["invalidated"]).inc();
                trace!(%id, "Entry invalidated");
                true
            }
            None => false,
        }
    }

    /// Evicts every entry idle for longer than its ttl
    pub fn sweep(
        &self,
        now: Instant,
    ) -> usize {
        let expired: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in expired {
            // re-checked: the entry may have been touched since
            if self.entries.remove_if(&id, |_, entry| entry.is_expired(now)).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            CACHE_EVICTIONS.with_label_values(&["expired"]).inc_by(evicted as u64);
            debug!(evicted, remaining = self.entries.len(), "Expired entries swept");
        }
        evicted
    }

    /// Whether `id` is cached, without refreshing it
    pub fn contains(
        &self,
        id: &ResourceId,
    ) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry and its watch
    pub fn clear(&self) {
        let ids: Vec<ResourceId> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.invalidate(&id);
        }
    }
}
