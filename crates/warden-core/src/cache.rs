//! Bounded TTL cache shared by all result caches.
//!
//! One generic cache type backs the detection, suspicion, sanitization, and
//! moderation caches: fixed capacity, per-entry expiry, and insertion-order
//! batch eviction of the oldest fraction when full. Eviction is deliberately
//! not LRU — a read does not refresh an entry's position — so eviction order
//! is a pure function of insertion order.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Fraction of capacity evicted in one batch when the cache is full.
const EVICTION_DIVISOR: usize = 4;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    order: VecDeque<K>,
    hits: u64,
    misses: u64,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed (absent or expired).
    pub misses: u64,
    /// Entries currently resident.
    pub len: usize,
}

/// A bounded, internally synchronized TTL cache.
pub struct BoundedTtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> BoundedTtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries, each valid for
    /// `ttl` after insertion.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Looks up a key, counting a hit or a miss. Expired entries are removed
    /// on access and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.misses += 1;
            return None;
        }
        inner.hits += 1;
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Inserts a value, evicting the oldest batch first if the cache is at
    /// capacity. Re-inserting an existing key refreshes its value and expiry
    /// but keeps its eviction position.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            inner.entries.insert(
                key,
                Entry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
            return;
        }
        if inner.entries.len() >= self.capacity {
            let batch = (self.capacity / EVICTION_DIVISOR).max(1);
            for _ in 0..batch {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes every expired entry. Intended for an optional periodic sweep
    /// task owned by the host; request handling never depends on it.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        let entries = &inner.entries;
        let retained: VecDeque<K> = inner
            .order
            .iter()
            .filter(|k| entries.contains_key(*k))
            .cloned()
            .collect();
        inner.order = retained;
        before - inner.entries.len()
    }

    /// Drops all entries, keeping counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Returns hit/miss/occupancy counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
