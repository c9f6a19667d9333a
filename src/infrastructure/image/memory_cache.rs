//! In-memory size-weighted LRU image cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, ImageAsset};
use crate::domain::ports::ImageCachePort;

/// Default memory budget in kilobytes (512 MiB).
pub const DEFAULT_MEMORY_BUDGET_KB: u64 = 512 * 1024;

/// The cache takes `1 / BUDGET_FRACTION` of the memory budget.
pub const BUDGET_FRACTION: u64 = 8;

struct Entries {
    lru: LruCache<CacheKey, ImageAsset>,
    total_size: usize,
}

/// In-memory LRU cache for decoded assets, bounded by accumulated byte size.
///
/// Static assets weigh their decoded pixel bytes, animated assets their
/// compressed container length.
pub struct MemoryImageCache {
    entries: Arc<RwLock<Entries>>,
    capacity: usize,
    count: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries {
                lru: LruCache::unbounded(),
                total_size: 0,
            })),
            capacity,
            count: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized to an eighth of `budget_kb`.
    #[must_use]
    pub fn from_budget_kb(budget_kb: u64) -> Self {
        let bytes = budget_kb.saturating_mul(1024) / BUDGET_FRACTION;
        Self::new(usize::try_from(bytes).unwrap_or(usize::MAX))
    }

    /// Capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Accumulated size of all entries in bytes.
    pub async fn size(&self) -> usize {
        self.entries.read().await.total_size
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
        let total_size = self
            .entries
            .try_read()
            .map(|e| e.total_size)
            .unwrap_or_default();
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: self.len(),
            total_size,
            capacity: self.capacity,
        }
    }

    /// Peeks at an asset without promoting it in the LRU.
    pub async fn peek(&self, key: &CacheKey) -> Option<ImageAsset> {
        let entries = self.entries.read().await;
        entries.lru.peek(key).cloned()
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::from_budget_kb(DEFAULT_MEMORY_BUDGET_KB)
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
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
    /// Current number of cached assets.
    pub entries: usize,
    /// Accumulated entry size in bytes.
    pub total_size: usize,
    /// Capacity in bytes.
    pub capacity: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} KiB, {:.1}% hit rate ({} hits, {} misses)",
            self.entries,
            self.total_size / 1024,
            self.capacity / 1024,
            self.hit_rate,
            self.hits,
            self.misses
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &CacheKey) -> Option<ImageAsset> {
        let mut entries = self.entries.write().await;
        if let Some(asset) = entries.lru.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(asset.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    async fn put(&self, key: CacheKey, asset: ImageAsset) {
        let size = asset.byte_size();
        if size > self.capacity {
            debug!(key = %key, size, capacity = self.capacity, "Asset exceeds memory cache capacity");
            return;
        }

        let mut entries = self.entries.write().await;
        if entries.lru.contains(&key) {
            trace!(key = %key, "Memory cache entry already present");
            return;
        }

        while entries.total_size + size > self.capacity {
            let Some((evicted, old)) = entries.lru.pop_lru() else {
                break;
            };
            entries.total_size -= old.byte_size();
            trace!(key = %evicted, "Evicted least recently used image");
        }

        debug!(key = %key, size, "Storing image in memory cache");
        entries.total_size += size;
        entries.lru.put(key, asset);
        self.count.store(entries.lru.len(), Ordering::Relaxed);
    }

    async fn evict(&self, key: &CacheKey) {
        let mut entries = self.entries.write().await;
        if let Some(old) = entries.lru.pop(key) {
            entries.total_size -= old.byte_size();
            self.count.store(entries.lru.len(), Ordering::Relaxed);
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.lru.clear();
        entries.total_size = 0;
        self.count.store(0, Ordering::Relaxed);
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AnimatedFormat, AnimatedImage, ResourceId, TransformDescriptor};
    use bytes::Bytes;

    /// 10x10 RGB8 raster: 300 bytes.
    fn raster() -> ImageAsset {
        ImageAsset::from_raster(image::DynamicImage::new_rgb8(10, 10))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::new(&ResourceId::new(name), &TransformDescriptor::None)
    }

    #[tokio::test]
    async fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(10_000);
        let asset = ImageAsset::from_raster(image::DynamicImage::new_rgb8(40, 20));

        cache.put(key("test1"), asset).await;
        let retrieved = cache.get(&key("test1")).await;

        assert_eq!(retrieved.unwrap().dimensions(), (40, 20));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = MemoryImageCache::new(10_000);
        assert!(cache.get(&key("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction_by_size() {
        let cache = MemoryImageCache::new(600);

        cache.put(key("test1"), raster()).await;
        cache.put(key("test2"), raster()).await;
        cache.put(key("test3"), raster()).await;

        // test1 should be evicted (LRU)
        assert!(cache.get(&key("test1")).await.is_none());
        assert!(cache.get(&key("test2")).await.is_some());
        assert!(cache.get(&key("test3")).await.is_some());
        assert!(cache.size().await <= cache.capacity());
    }

    #[tokio::test]
    async fn test_get_promotes_entry() {
        let cache = MemoryImageCache::new(600);

        cache.put(key("test1"), raster()).await;
        cache.put(key("test2"), raster()).await;
        let _ = cache.get(&key("test1")).await;
        cache.put(key("test3"), raster()).await;

        assert!(cache.peek(&key("test1")).await.is_some());
        assert!(cache.peek(&key("test2")).await.is_none());
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = MemoryImageCache::new(100_000);
        let first = ImageAsset::from_raster(image::DynamicImage::new_rgb8(10, 10));
        let second = ImageAsset::from_raster(image::DynamicImage::new_rgb8(20, 20));

        cache.put(key("same"), first).await;
        cache.put(key("same"), second).await;

        assert_eq!(cache.get(&key("same")).await.unwrap().dimensions(), (10, 10));
        assert_eq!(cache.size().await, 300);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_not_stored() {
        let cache = MemoryImageCache::new(100);
        cache.put(key("huge"), raster()).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_animated_weighs_container_bytes() {
        let cache = MemoryImageCache::new(1000);
        let animated = ImageAsset::Animated(AnimatedImage {
            bytes: Bytes::from(vec![0u8; 64]),
            format: AnimatedFormat::Gif,
            frame_count: 10,
            width: 500,
            height: 500,
        });

        cache.put(key("anim"), animated).await;

        assert_eq!(cache.size().await, 64);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = MemoryImageCache::new(10_000);
        cache.put(key("test1"), raster()).await;

        // Hit
        let _ = cache.get(&key("test1")).await;
        // Miss
        let _ = cache.get(&key("missing")).await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, 300);
        assert!(stats.to_string().contains("50.0% hit rate"));
    }

    #[tokio::test]
    async fn test_evict_and_clear() {
        let cache = MemoryImageCache::new(10_000);
        cache.put(key("a"), raster()).await;
        cache.put(key("b"), raster()).await;

        cache.evict(&key("a")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size().await, 300);

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(600);

        cache.put(key("test1"), raster()).await;
        cache.put(key("test2"), raster()).await;

        // Peek at test1 (should not promote it)
        let _ = cache.peek(&key("test1")).await;

        // Add test3, should evict test1 (since peek doesn't promote)
        cache.put(key("test3"), raster()).await;

        assert!(cache.peek(&key("test1")).await.is_none());
    }

    #[test]
    fn test_get_waits_for_writer() {
        let cache = MemoryImageCache::new(10_000);
        let guard = cache.entries.try_write().unwrap();
        let missing = key("absent");

        let mut get = tokio_test::task::spawn(cache.get(&missing));
        tokio_test::assert_pending!(get.poll());

        drop(guard);
        assert!(get.is_woken());
        assert_eq!(tokio_test::assert_ready!(get.poll()), None);
    }

    #[test]
    fn test_budget_fraction() {
        let cache = MemoryImageCache::from_budget_kb(8);
        assert_eq!(cache.capacity(), 1024);
        assert_eq!(MemoryImageCache::default().capacity(), 64 * 1024 * 1024);
    }
}
