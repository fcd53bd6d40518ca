//! Bounded key/value cache with time-to-live expiry.
//!
//! Eviction is by insertion order, not recency: when full, the entry that was
//! inserted first goes, even if it was read a moment ago. A `get` never
//! refreshes an entry; re-setting an existing key refreshes its timestamp but
//! keeps its place in the eviction order. TTL bounds staleness regardless of
//! access pattern.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::clock::{SharedClock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Duration,
    /// Insertion sequence; matches exactly one record in the order queue.
    seq: u64,
}

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Entries are removed with `swap_remove`, so the map's own order is not the
/// insertion order. `order` keeps that as `(seq, key)` records; a record whose
/// entry was removed or re-inserted under a newer seq is stale and skipped.
pub struct MemoCache<K, V> {
    entries: IndexMap<K, CacheEntry<V>>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
    capacity: usize,
    ttl: Duration,
    clock: SharedClock,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> MemoCache<K, V> {
    /// Create a cache reading time from the system clock.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            next_seq: 0,
            capacity,
            ttl,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Look up a live entry. Expired entries are removed and reported as absent.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(index) = self.entries.get_index_of(key) else {
            self.stats.misses += 1;
            return None;
        };

        let now = self.clock.now();
        let stored_at = self.entries[index].stored_at;
        if now.saturating_sub(stored_at) > self.ttl {
            self.entries.swap_remove_index(index);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            self.compact_order();
            return None;
        }

        self.stats.hits += 1;
        self.entries.get_index(index).map(|(_, entry)| &entry.value)
    }

    /// Store a value, evicting the oldest-inserted entry when full.
    pub fn set(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let stored_at = self.clock.now();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.stored_at = stored_at;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.insert(key, CacheEntry { value, stored_at, seq });
    }

    fn is_live(&self, seq: u64, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.seq == seq)
    }

    fn evict_oldest(&mut self) {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.is_live(seq, &key) {
                self.entries.swap_remove(&key);
                self.stats.evictions += 1;
                return;
            }
        }
    }

    /// Drop stale order records once they outnumber live entries.
    fn compact_order(&mut self) {
        if self.order.len() <= 2 * self.entries.len() + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|entry| entry.seq == *seq));
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.swap_remove(key).map(|entry| entry.value);
        if removed.is_some() {
            self.compact_order();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(capacity: usize, ttl_ms: u64) -> (MemoCache<String, u32>, ManualClock) {
        let clock = ManualClock::new();
        let cache = MemoCache::with_clock(capacity, Duration::from_millis(ttl_ms), Rc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn test_get_after_set() {
        let (mut cache, _clock) = cache(4, 1000);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let (mut cache, clock) = cache(4, 1000);
        cache.set("a".to_string(), 1);

        clock.advance(Duration::from_millis(1000));
        assert_eq!(cache.get("a"), Some(&1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_evicts_oldest_inserted_not_least_recent() {
        let (mut cache, _clock) = cache(2, 1000);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        // Reading "a" does not protect it.
        assert_eq!(cache.get("a"), Some(&1));
        cache.set("c".to_string(), 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("c"), Some(&3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reset_refreshes_timestamp_but_not_position() {
        let (mut cache, clock) = cache(2, 100);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        clock.advance(Duration::from_millis(80));
        cache.set("a".to_string(), 10);
        clock.advance(Duration::from_millis(50));

        // "a" was refreshed, "b" expired.
        assert_eq!(cache.get("a"), Some(&10));
        assert_eq!(cache.get("b"), None);

        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);
        // "a" is still first in insertion order, so it is evicted.
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let (mut cache, _clock) = cache(0, 1000);
        cache.set("a".to_string(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let (mut cache, _clock) = cache(4, 1000);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.remove("a"), None);
    }

    #[test]
    fn test_expiry_in_the_middle_keeps_eviction_order() {
        let (mut cache, clock) = cache(3, 100);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);

        clock.advance(Duration::from_millis(80));
        cache.set("a".to_string(), 10);
        cache.set("c".to_string(), 30);
        clock.advance(Duration::from_millis(50));
        assert_eq!(cache.get("b"), None);

        cache.set("d".to_string(), 4);
        cache.set("e".to_string(), 5);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(&30));

        cache.set("f".to_string(), 6);
        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.get("d"), Some(&4));
        assert_eq!(cache.get("e"), Some(&5));
        assert_eq!(cache.get("f"), Some(&6));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_reinserted_key_goes_to_the_back() {
        let (mut cache, _clock) = cache(2, 1000);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        assert_eq!(cache.remove("a"), Some(1));
        cache.set("a".to_string(), 3);

        // "b" is now the oldest insertion.
        cache.set("c".to_string(), 4);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(&3));
    }

    #[test]
    fn test_order_records_stay_bounded() {
        let (mut cache, clock) = cache(4, 10);
        for i in 0..1000 {
            cache.set(format!("k{}", i), i);
            clock.advance(Duration::from_millis(11));
            assert_eq!(cache.get(format!("k{}", i).as_str()), None);
        }
        assert!(cache.is_empty());
        assert!(cache.order.len() <= 16);
    }
}
