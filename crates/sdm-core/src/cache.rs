//! Bounded LRU memoization of push test results.
//!
//! Keys combine the push identity with the test name, so one process-wide
//! cache can serve concurrent decision passes for different pushes.

use std::sync::{Arc, Mutex, OnceLock};

use linked_hash_map::LinkedHashMap;

use crate::metrics::METRICS;
use crate::push::PushId;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

static GLOBAL: OnceLock<Arc<PushTestCache>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    push: PushId,
    test: String,
}

/// LRU cache of `(push, test name) -> bool`.
#[derive(Debug)]
pub struct PushTestCache {
    capacity: usize,
    entries: Mutex<LinkedHashMap<CacheKey, bool>>,
}

impl PushTestCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(LinkedHashMap::new()),
        }
    }

    /// Install the process-wide cache with the given capacity.
    ///
    /// Returns `false` if the global cache was already initialised (by an
    /// earlier call or by first use), in which case the capacity is unchanged.
    pub fn init_global(capacity: usize) -> bool {
        GLOBAL.set(Arc::new(Self::new(capacity))).is_ok()
    }

    /// The process-wide cache, created with [`DEFAULT_CACHE_CAPACITY`] on
    /// first use unless [`init_global`](Self::init_global) ran before.
    pub fn global() -> Arc<PushTestCache> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::new(DEFAULT_CACHE_CAPACITY)))
            .clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a result, marking it most recently used.
    pub fn get(&self, push: &PushId, test: &str) -> Option<bool> {
        let key = CacheKey {
            push: push.clone(),
            test: test.to_string(),
        };
        let mut entries = self.entries.lock().unwrap();
        let hit = entries.get_refresh(&key).copied();
        match hit {
            Some(_) => METRICS.inc_cache_hits(),
            None => METRICS.inc_cache_misses(),
        }
        hit
    }

    pub fn insert(&self, push: &PushId, test: &str, value: bool) {
        let key = CacheKey {
            push: push.clone(),
            test: test.to_string(),
        };
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, value);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
