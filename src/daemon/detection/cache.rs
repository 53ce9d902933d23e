use std::{hash::Hash, num::NonZeroUsize, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::utils::clock::SharedClock;

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

/// LRU cache whose entries also expire `timeout` after insertion. Internally synchronized so one
/// instance can be shared between detectors.
pub struct BoundedCache<K: Hash + Eq, T> {
    entries: Mutex<LruCache<K, CacheEntry<T>>>,
    timeout: Duration,
    clock: SharedClock,
}

impl<K: Hash + Eq, T: Clone> BoundedCache<K, T> {
    pub fn new(capacity: usize, timeout: Duration, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            timeout,
            clock,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) > self.timeout
    }

    /// Returns a copy of the value. Expired entries are evicted on the way, hits become the most
    /// recently used entry.
    pub fn get(&self, key: &K) -> Option<T> {
        let now = self.clock.instant();
        let mut entries = self.entries.lock();
        let expired = self.is_expired(entries.peek(key)?, now);
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts or replaces a value. A new key on a full cache evicts the least recently used
    /// entry first.
    pub fn set(&self, key: K, value: T) {
        let inserted_at = self.clock.instant();
        self.entries.lock().put(key, CacheEntry { value, inserted_at });
    }

    /// Removes every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.instant();
        let mut entries = self.entries.lock();
        let expired = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .count();
        if expired == 0 {
            return 0;
        }
        let mut kept = LruCache::new(entries.cap());
        // Oldest first, so the rebuilt cache keeps the recency order.
        while let Some((key, entry)) = entries.pop_lru() {
            if !self.is_expired(&entry, now) {
                kept.put(key, entry);
            }
        }
        *entries = kept;
        expired
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}
