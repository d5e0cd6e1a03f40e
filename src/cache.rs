
//! A small LRU cache with eviction statistics,
//! used to keep recently decoded chunks around.

use std::collections::HashMap;
use std::hash::Hash;


/// Counters describing how the cache has been used so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {

    /// Lookups that found an entry.
    pub hits: u64,

    /// Lookups that found nothing.
    pub misses: u64,

    /// Entries displaced to make room for new ones.
    pub evicted_entries: u64,

    /// Entries that were evicted without ever being accessed after
    /// insertion. A nonzero value suggests the capacity is too small
    /// or the access pattern defeats the cache.
    pub unused_entries: u64,
}


#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_access: u64,
    was_accessed: bool,
}


/// Maps keys to values, keeping at most `capacity` entries
/// and evicting the least recently used one beyond that.
#[derive(Debug)]
pub struct Cache<K: Hash + Eq + Clone, V> {
    capacity: usize,
    entries: HashMap<K, CacheEntry<V>>,
    access_counter: u64,
    statistics: CacheStatistics,
}

impl<K: Hash + Eq + Clone, V> Cache<K, V> {

    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a cache without capacity cannot hold anything");
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity + 1),
            access_counter: 0,
            statistics: CacheStatistics::default(),
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn statistics(&self) -> CacheStatistics { self.statistics }

    /// Look up a key, marking the entry as recently used.
    pub fn get(&mut self, key: &K) -> Option<V> where V: Clone {
        self.access_counter += 1;

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.access_counter;
                entry.was_accessed = true;
                self.statistics.hits += 1;
                Some(entry.value.clone())
            },

            None => {
                self.statistics.misses += 1;
                None
            },
        }
    }

    /// Insert a value. Replacing an existing key's value keeps its access
    /// history and never triggers an eviction.
    pub fn insert(&mut self, key: K, value: V) {
        self.access_counter += 1;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.last_access = self.access_counter;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_least_recently_used();
        }

        self.entries.insert(key, CacheEntry {
            value,
            last_access: self.access_counter,
            was_accessed: false,
        });
    }

    /// Remove an entry, for example because its contents turned out
    /// to be wrong. Not counted as an eviction.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    fn evict_least_recently_used(&mut self) {
        let oldest = self.entries.iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            let entry = self.entries.remove(&key).expect("entry vanished during eviction");
            self.statistics.evicted_entries += 1;

            if !entry.was_accessed {
                self.statistics.unused_entries += 1;
                log::debug!("cache evicted a never-accessed entry");
            }
        }
    }
}
