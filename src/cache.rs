//! Bounded cache of compiled query templates.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::statement::{CompiledQuery, compile};

/// Default number of compiled templates kept per cache.
pub const DEFAULT_QUERY_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// LRU cache from template text to its compiled form.
///
/// Compiling the same template twice returns the same `Arc`, so each distinct
/// template is compiled at most once while it stays cached.
pub struct QueryCache {
    entries: Mutex<LruCache<String, Arc<CompiledQuery>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` templates.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached compilation of `template`, compiling it on a miss.
    pub fn get_or_compile(&self, template: &str) -> Arc<CompiledQuery> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = entries.get(template) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(compiled);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile(template));
        entries.put(template.to_string(), Arc::clone(&compiled));
        compiled
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that had to compile.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the cache holds no templates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_CACHE_SIZE)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

/// Compile `template`, going through `cache` when there is one.
pub fn prepare(cache: Option<&QueryCache>, template: &str) -> Arc<CompiledQuery> {
    match cache {
        Some(cache) => cache.get_or_compile(template),
        None => Arc::new(compile(template)),
    }
}
