//! Route resolution caching
//!
//! Remembers which route an href resolved to, with LRU eviction. A cached
//! index is only a hint: the router re-runs that route's matcher and rules
//! before trusting it.

use crate::trace_log;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Cache performance statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Cached routes that no longer matched
    pub stale: usize,
    pub invalidations: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Href -> route index cache with LRU eviction
///
/// Default capacity: 256 entries.
#[derive(Debug)]
pub struct RouteCache {
    entries: LruCache<String, usize>,
    stats: CacheStats,
}

impl RouteCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// A zero capacity falls back to one entry
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, href: &str) -> Option<usize> {
        if let Some(index) = self.entries.get(href) {
            self.stats.hits += 1;
            trace_log!("route cache hit for '{}'", href);
            Some(*index)
        } else {
            self.stats.misses += 1;
            trace_log!("route cache miss for '{}'", href);
            None
        }
    }

    pub fn insert(&mut self, href: String, index: usize) {
        self.entries.push(href, index);
    }

    /// Forget an entry whose route stopped matching
    pub fn invalidate(&mut self, href: &str) {
        if self.entries.pop(href).is_some() {
            self.stats.stale += 1;
        }
    }

    pub fn clear(&mut self) {
        trace_log!("Clearing route cache");
        self.entries.clear();
        self.stats.invalidations += 1;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new()
    }
}
