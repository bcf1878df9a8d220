//! Time-expiring entity cache

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
}

struct CacheEntry<E> {
    value: E,
    cached_at: DateTime<Utc>,
}

struct Inner<E> {
    entries: HashMap<String, CacheEntry<E>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Id-keyed cache whose entries go stale a fixed TTL after they were stored
///
/// Staleness is only detected on access; there is no sweeper. A stale entry
/// stays in the map until it is overwritten or evicted. The lock is never
/// held across an `.await`.
pub struct EntityCache<E> {
    inner: Mutex<Inner<E>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<E: Clone> EntityCache<E> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<E>, now: DateTime<Utc>) -> bool {
        now - entry.cached_at < self.ttl
    }

    /// Return the entry for `id` if it is still within its TTL
    pub fn get_fresh(&self, id: &str) -> Option<E> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let hit = inner
            .entries
            .get(id)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone());

        if hit.is_some() {
            inner.hits += 1;
            debug!("Cache hit: {}", id);
        } else {
            inner.misses += 1;
            debug!("Cache miss: {}", id);
        }
        hit
    }

    /// Linear scan over fresh entries
    pub fn find(&self, mut predicate: impl FnMut(&E) -> bool) -> Option<E> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let found = inner
            .entries
            .values()
            .filter(|entry| self.is_fresh(entry, now))
            .find(|entry| predicate(&entry.value))
            .map(|entry| entry.value.clone());
        if found.is_some() {
            inner.hits += 1;
        }
        found
    }

    /// Store or overwrite an entry, restarting its freshness window
    pub fn put(&self, id: &str, value: E) {
        let cached_at = self.clock.now();
        self.inner
            .lock()
            .entries
            .insert(id.to_string(), CacheEntry { value, cached_at });
    }

    /// Evict one entry; returns whether anything was removed
    pub fn evict(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(id).is_some();
        if removed {
            inner.evictions += 1;
            debug!("Evicted cache entry: {}", id);
        }
        removed
    }

    /// Evict everything; returns the number of entries dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.evictions += count as u64;
        count
    }

    /// Number of entries held, fresh or stale
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entry_count: inner.entries.len() as u64,
            hit_count: inner.hits,
            miss_count: inner.misses,
            eviction_count: inner.evictions,
        }
    }
}
