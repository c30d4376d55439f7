//! Small bounded cache with least-recently-used eviction.
//!
//! Backs the per-domain cosmetic selector sets, which hold a few hundred
//! entries at most. Eviction scans for the oldest stamp instead of
//! maintaining a linked list.

use std::collections::HashMap;

#[derive(Debug)]
pub struct LruCache<V> {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, (V, u64)>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            clock: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Clone of the cached value. Marks the entry as recently used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.tick();
        let (value, stamp) = self.entries.get_mut(key)?;
        *stamp = now;
        Some(value.clone())
    }

    pub fn insert(&mut self, key: String, value: V) {
        let now = self.tick();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (value, now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_does_not_grow() {
        let mut cache = LruCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("a".to_string(), 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(5));
        cache.clear();
        assert!(cache.is_empty());
    }
}
