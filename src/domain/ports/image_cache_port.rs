//! Port definition for image caching.

use crate::domain::entities::{CachedImage, ImageKey};

/// Port for the decoded image cache shared by all loaders.
///
/// Implementations must be thread-safe and must never perform I/O: a lookup
/// is answered from memory or reported as a miss.
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache.
    /// Returns None if not cached.
    fn get(&self, key: &ImageKey) -> Option<CachedImage>;

    /// Stores an image in the cache, replacing any previous entry for `key`.
    /// May evict other entries to stay within the configured limits.
    fn set(&self, key: ImageKey, image: CachedImage);

    /// Removes an image from the cache.
    fn remove(&self, key: &ImageKey);

    /// Clears all images from the cache.
    fn clear(&self);

    /// Sets the entry count and total cost limits. `0` disables a limit.
    /// New limits are enforced on the next insert.
    fn configure_limits(&self, max_count: usize, max_cost: usize);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
