//! In-memory LRU image cache implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CachedImage, ImageKey};
use crate::domain::ports::ImageCachePort;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_MAX_COUNT: usize = 100;

/// Default maximum total cost (decoded bytes) held in memory.
pub const DEFAULT_MAX_COST: usize = 256 * 1024 * 1024;

struct CacheEntry {
    image: CachedImage,
    cost: usize,
}

struct CacheInner {
    entries: LruCache<ImageKey, CacheEntry>,
    total_cost: usize,
    max_count: usize,
    max_cost: usize,
}

impl CacheInner {
    fn over_limits(&self) -> bool {
        (self.max_count > 0 && self.entries.len() > self.max_count)
            || (self.max_cost > 0 && self.total_cost > self.max_cost)
    }

    fn evict_to_limits(&mut self) {
        while self.over_limits() {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_cost -= entry.cost;
            debug!(key = %key, cost = entry.cost, "Evicted image from memory cache");
        }
    }
}

/// In-memory LRU cache for decoded images, bounded by entry count and total
/// cost. Thread-safe; every operation holds the lock only for the duration of
/// a map update.
pub struct MemoryImageCache {
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the specified limits. `0` disables a limit.
    #[must_use]
    pub fn new(max_count: usize, max_cost: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_cost: 0,
                max_count,
                max_cost,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default limits.
    #[must_use]
    pub fn with_default_limits() -> Self {
        Self::new(DEFAULT_MAX_COUNT, DEFAULT_MAX_COST)
    }

    /// Returns a process-wide instance, created with the default limits on
    /// first use. Callers still pass it explicitly to loaders.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<MemoryImageCache>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(Self::with_default_limits()))
            .clone()
    }

    /// Estimated memory footprint of a decoded image.
    #[must_use]
    pub fn cost_of(image: &image::DynamicImage) -> usize {
        image.as_bytes().len()
    }

    /// Returns the summed cost of all resident entries.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        self.inner.lock().total_cost
    }

    /// Returns the configured `(max_count, max_cost)` limits.
    #[must_use]
    pub fn limits(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.max_count, inner.max_cost)
    }

    /// Returns true if `key` is resident, without touching recency or stats.
    #[must_use]
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Peeks at an image without promoting it in the LRU.
    #[must_use]
    pub fn peek(&self, key: &ImageKey) -> Option<CachedImage> {
        self.inner
            .lock()
            .entries
            .peek(key)
            .map(|entry| entry.image.clone())
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            total_cost: inner.total_cost,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_limits()
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of the cached images.
    pub total_cost: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &ImageKey) -> Option<CachedImage> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn set(&self, key: ImageKey, image: CachedImage) {
        let cost = Self::cost_of(&image);
        let mut inner = self.inner.lock();

        // An entry that can never fit must not flush the rest of the cache.
        if inner.max_cost > 0 && cost > inner.max_cost {
            if let Some(previous) = inner.entries.pop(&key) {
                inner.total_cost -= previous.cost;
            }
            debug!(
                key = %key,
                cost,
                max_cost = inner.max_cost,
                "Image exceeds cache cost limit, not stored"
            );
            return;
        }

        debug!(key = %key, cost, "Storing image in memory cache");
        if let Some(previous) = inner.entries.put(key, CacheEntry { image, cost }) {
            inner.total_cost -= previous.cost;
        }
        inner.total_cost += cost;
        inner.evict_to_limits();
    }

    fn remove(&self, key: &ImageKey) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.pop(key) {
            inner.total_cost -= entry.cost;
            debug!(key = %key, "Removed image from memory cache");
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        if inner.entries.is_empty() {
            return;
        }
        inner.entries.clear();
        inner.total_cost = 0;
        debug!("Cleared memory image cache");
    }

    fn configure_limits(&self, max_count: usize, max_cost: usize) {
        let mut inner = self.inner.lock();
        inner.max_count = max_count;
        inner.max_cost = max_cost;
        debug!(max_count, max_cost, "Configured memory cache limits");
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
