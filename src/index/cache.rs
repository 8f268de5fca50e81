//! Short-lived in-memory caches
//!
//! Used for note content and for the indexed-ID set of each namespace. An
//! entry is valid until its TTL elapses or it is invalidated; when a capacity
//! is set and exceeded, the least recently accessed fifth is evicted.
//!
//! Loads that race with an invalidation go through [`TtlCache::generation`]
//! and [`TtlCache::set_if_current`], so a value read before a write can never
//! be cached after that write's invalidation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedEntry<V> {
    value: V,
    inserted_at: Instant,
    last_access: Instant,
}

impl<V> CachedEntry<V> {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

struct Slots<K, V> {
    entries: HashMap<K, CachedEntry<V>>,
    /// Invalidation count per key
    generations: HashMap<K, u64>,
    /// Invalidation count of `invalidate_all`
    epoch: u64,
}

impl<K: Eq + Hash, V> Slots<K, V> {
    fn generation(&self, key: &K) -> Generation {
        Generation {
            epoch: self.epoch,
            key: self.generations.get(key).copied().unwrap_or(0),
        }
    }
}

/// Invalidation state of one key, taken before loading its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    key: u64,
}

/// Thread-safe TTL cache with optional capacity
pub struct TtlCache<K, V> {
    slots: Mutex<Slots<K, V>>,
    ttl: Duration,
    capacity: Option<usize>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            }),
            ttl,
            capacity: None,
        }
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new(ttl)
        }
    }

    /// Cached value, if present and still valid
    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock();
        match slots.entries.get_mut(key) {
            Some(entry) if entry.is_valid(self.ttl) => {
                entry.last_access = Instant::now();
                Some(entry.value.clone())
            }
            Some(_) => {
                slots.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V) {
        let mut slots = self.slots.lock();
        self.insert(&mut slots, key, value);
    }

    /// Current invalidation state of `key`; pass it to [`Self::set_if_current`]
    pub fn generation(&self, key: &K) -> Generation {
        self.slots.lock().generation(key)
    }

    /// Store `value` only if `key` was not invalidated since `seen` was taken.
    /// Returns whether the value was stored.
    pub fn set_if_current(&self, key: K, value: V, seen: Generation) -> bool {
        let mut slots = self.slots.lock();
        if slots.generation(&key) != seen {
            debug!("Discarding value loaded before an invalidation");
            return false;
        }
        self.insert(&mut slots, key, value);
        true
    }

    fn insert(&self, slots: &mut Slots<K, V>, key: K, value: V) {
        let now = Instant::now();
        slots.entries.insert(
            key,
            CachedEntry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );

        if let Some(capacity) = self.capacity {
            if slots.entries.len() > capacity {
                evict_oldest(&mut slots.entries, capacity);
            }
        }
    }

    pub fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock();
        slots.entries.remove(key);
        *slots.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub fn invalidate_all(&self) {
        let mut slots = self.slots.lock();
        slots.entries.clear();
        slots.epoch += 1;
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the least recently accessed ~20% (at least enough to fit)
fn evict_oldest<K, V>(entries: &mut HashMap<K, CachedEntry<V>>, capacity: usize)
where
    K: Eq + Hash + Clone,
{
    let target = (capacity / 5).max(entries.len() - capacity).max(1);

    let mut by_access: Vec<(K, Instant)> = entries
        .iter()
        .map(|(k, e)| (k.clone(), e.last_access))
        .collect();
    by_access.sort_by_key(|(_, accessed)| *accessed);

    for (key, _) in by_access.into_iter().take(target) {
        entries.remove(&key);
    }
    debug!(evicted = target, remaining = entries.len(), "Evicted cache entries");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_invalidate() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.set("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.set("b".into(), 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(20));
        cache.set("a", 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::ZERO);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed() {
        let cache: TtlCache<u32, u32> = TtlCache::with_capacity(Duration::from_secs(60), 10);
        for i in 0..10 {
            cache.set(i, i);
            std::thread::sleep(Duration::from_millis(2));
        }
        // Touch the two oldest so they survive
        cache.get(&0);
        cache.get(&1);

        cache.set(10, 10);
        assert_eq!(cache.len(), 9);
        assert_eq!(cache.get(&0), Some(0));
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), None);
        assert_eq!(cache.get(&10), Some(10));
    }

    #[test]
    fn test_load_started_before_invalidate_is_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let seen = cache.generation(&"ns");
        cache.invalidate(&"ns");
        assert!(!cache.set_if_current("ns", 1, seen));
        assert_eq!(cache.get(&"ns"), None);

        let seen = cache.generation(&"ns");
        assert!(cache.set_if_current("ns", 2, seen));
        assert_eq!(cache.get(&"ns"), Some(2));
    }

    #[test]
    fn test_invalidate_all_outdates_every_generation() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let seen = cache.generation(&"a");
        cache.invalidate(&"b");
        assert!(cache.set_if_current("a", 1, seen));

        let seen = cache.generation(&"a");
        cache.invalidate_all();
        assert!(!cache.set_if_current("a", 2, seen));
        assert!(cache.is_empty());
    }
}
