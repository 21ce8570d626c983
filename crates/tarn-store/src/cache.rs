//! Bounded, internally synchronized LRU caches.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// A fixed-capacity LRU cache safe to share across tasks.
///
/// Cache contents are best effort: the durable store is always the source of
/// truth, so `remove` on an absent key is not an error.
pub struct SharedLru<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> SharedLru<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a value, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert or replace a value, evicting the least recently used entry at
    /// capacity.
    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Remove an entry if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> SharedLru<u32, String> {
        SharedLru::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(2);
        c.put(1, "a".into());
        c.put(2, "b".into());
        assert_eq!(c.get(&1), Some("a".into()));
        c.put(3, "c".into());
        // 2 was the least recently used
        assert_eq!(c.get(&2), None);
        assert_eq!(c.get(&1), Some("a".into()));
        assert_eq!(c.get(&3), Some("c".into()));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn remove_is_miss_tolerant() {
        let c = cache(2);
        assert_eq!(c.remove(&7), None);
        c.put(7, "x".into());
        assert_eq!(c.remove(&7), Some("x".into()));
        assert!(c.is_empty());
    }

    #[test]
    fn put_replaces() {
        let c = cache(2);
        c.put(1, "a".into());
        c.put(1, "b".into());
        assert_eq!(c.get(&1), Some("b".into()));
        assert_eq!(c.len(), 1);
    }
}
