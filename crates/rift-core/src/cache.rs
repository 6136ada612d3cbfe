//! Bounded memo cache for interaction-time derivations

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

/// Default number of retained derivations.
pub const DEFAULT_CAPACITY: usize = 64;

/// Content key for a serializable input: BLAKE3 over its JSON encoding.
pub fn content_key<T: Serialize>(input: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(input)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Fixed-capacity cache with oldest-first eviction. Values are shared so a
/// hit is a pointer clone.
#[derive(Debug)]
pub struct DerivationCache<V> {
    entries: HashMap<String, Arc<V>>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<V> DerivationCache<V> {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Arc<V>> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(Arc::clone(value))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: String, value: V) -> Arc<V> {
        let value = Arc::new(value);
        if self.entries.insert(key.clone(), Arc::clone(&value)).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        value
    }

    /// Return the cached value or compute, store, and return it.
    pub fn get_or_insert_with(&mut self, key: String, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        self.insert(key, compute())
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

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl<V> Default for DerivationCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_entry_at_capacity() {
        let mut cache = DerivationCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").as_deref(), Some(&3));
    }

    #[test]
    fn second_lookup_hits_without_recomputing() {
        let mut cache = DerivationCache::new(4);
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with("k".to_string(), || {
                calls += 1;
                42
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn content_key_depends_on_content() {
        let a = content_key(&("graph", vec!["n1"], false)).unwrap();
        let b = content_key(&("graph", vec!["n1"], true)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, content_key(&("graph", vec!["n1"], false)).unwrap());
    }
}
