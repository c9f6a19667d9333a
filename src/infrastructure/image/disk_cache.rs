//! Disk-based image cache for persistence across sessions.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, trace, warn};

use super::codec::ImageCrateDecoder;
use super::decoder::AnimatedDecoderFactory;
use super::sniffer;
use crate::domain::entities::{AnimatedFormat, ImageAsset, ResourceId};
use crate::domain::ports::{LoadError, LoadResult, RasterDecoderPort};

/// Extension of entries holding still images.
const STATIC_EXTENSION: &str = "png";

/// Extensions in lookup order: animated variants first.
const EXTENSIONS: [&str; 3] = ["gif", "webp", STATIC_EXTENSION];

fn is_entry(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

fn extension_for(format: Option<AnimatedFormat>) -> &'static str {
    format.map_or(STATIC_EXTENSION, AnimatedFormat::extension)
}

/// Disk-based image cache keyed by resource digest and partitioned by format.
///
/// Entries persist until [`DiskImageCache::evict`] or [`DiskImageCache::clear`].
pub struct DiskImageCache {
    cache_dir: PathBuf,
    decoders: AnimatedDecoderFactory,
    raster: Arc<dyn RasterDecoderPort>,
    current_size: AtomicU64,
    item_count: AtomicUsize,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created or read.
    pub async fn new(cache_dir: PathBuf, decoders: AnimatedDecoderFactory) -> LoadResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| LoadError::IoError(format!("Failed to create cache dir: {e}")))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| LoadError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if is_entry(&entry.path())
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        debug!(
            path = %cache_dir.display(),
            entries = count,
            size = total_size,
            "Opened disk cache"
        );

        Ok(Self {
            cache_dir,
            decoders,
            raster: Arc::new(ImageCrateDecoder),
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
        })
    }

    /// Creates a cache in the default location (~/.cache/oxipix/images/).
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn default_location(decoders: AnimatedDecoderFactory) -> LoadResult<Self> {
        Self::new(default_cache_dir(), decoders).await
    }

    /// Replaces the still-image decoder used by [`DiskImageCache::get`].
    #[must_use]
    pub fn with_raster_decoder(mut self, raster: Arc<dyn RasterDecoderPort>) -> Self {
        self.raster = raster;
        self
    }

    /// Directory holding the entries.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, id: &ResourceId, extension: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{extension}", id.digest()))
    }

    /// Finds the stored variant for `id`, animated extensions first.
    async fn find(&self, id: &ResourceId) -> Option<(PathBuf, &'static str)> {
        for extension in EXTENSIONS {
            let path = self.cache_path(id, extension);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some((path, extension));
            }
        }
        None
    }

    /// Gets raw entry bytes from disk cache.
    pub async fn get_bytes(&self, id: &ResourceId) -> Option<Bytes> {
        let Some((path, _)) = self.find(id).await else {
            trace!(id = %id, "Disk cache miss");
            return None;
        };

        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(id = %id, path = %path.display(), "Disk cache hit");
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read disk cache entry");
                None
            }
        }
    }

    /// Loads an asset from disk cache.
    ///
    /// Animated entries have their metadata re-extracted; a failed or
    /// unsupported probe falls back to a still decode of the same bytes.
    pub async fn get(&self, id: &ResourceId) -> Option<ImageAsset> {
        let (path, extension) = self.find(id).await?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read disk cache entry");
                return None;
            }
        };

        if extension != STATIC_EXTENSION
            && let Some(format) = sniffer::detect(&bytes)
        {
            match self.decoders.probe(bytes.clone(), format) {
                Ok(animated) => {
                    debug!(id = %id, format = %format, "Loaded animated image from disk cache");
                    return Some(ImageAsset::Animated(animated));
                }
                Err(e) => {
                    debug!(id = %id, error = %e, "Animated probe failed, trying still decode");
                }
            }
        }

        let raster = Arc::clone(&self.raster);
        let result = tokio::task::spawn_blocking(move || raster.decode(&bytes)).await;

        match result {
            Ok(Ok(img)) => {
                debug!(id = %id, "Decoded image from disk cache");
                Some(ImageAsset::from_raster(img))
            }
            Ok(Err(e)) => {
                warn!(id = %id, error = %e, "Failed to decode cached image");
                None
            }
            Err(e) => {
                error!(id = %id, error = %e, "Decode task panicked");
                None
            }
        }
    }

    /// Stores an asset: rasters are PNG-encoded, animated containers are
    /// written as-is.
    ///
    /// # Errors
    /// Returns error if encoding or writing fails.
    pub async fn put(&self, id: &ResourceId, asset: &ImageAsset) -> LoadResult<()> {
        match asset {
            ImageAsset::Animated(animated) => {
                self.write_entry(id, animated.format.extension(), &animated.bytes)
                    .await
            }
            ImageAsset::Static { raster } => {
                let raster = raster.clone();
                let encoded = tokio::task::spawn_blocking(move || {
                    let mut out = Vec::new();
                    raster
                        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                        .map(|()| out)
                })
                .await
                .map_err(|e| LoadError::IoError(format!("Encode task failed: {e}")))?
                .map_err(|e| LoadError::IoError(format!("Failed to encode PNG: {e}")))?;

                self.write_entry(id, STATIC_EXTENSION, &encoded).await
            }
        }
    }

    /// Stores raw bytes, choosing the extension by sniffing them.
    ///
    /// # Errors
    /// Returns error if file cannot be created or written.
    pub async fn put_bytes(&self, id: &ResourceId, bytes: &[u8]) -> LoadResult<()> {
        self.write_entry(id, extension_for(sniffer::detect(bytes)), bytes)
            .await
    }

    async fn write_entry(&self, id: &ResourceId, extension: &str, bytes: &[u8]) -> LoadResult<()> {
        let path = self.cache_path(id, extension);
        let tmp = self
            .cache_dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(LoadError::IoError(format!("Failed to write cache file: {e}")));
        }

        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(LoadError::IoError(format!("Failed to commit cache file: {e}")));
        }

        let new_size = bytes.len() as u64;
        if let Some(old) = old_size {
            self.current_size.fetch_sub(old, Ordering::Relaxed);
        } else {
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }
        self.current_size.fetch_add(new_size, Ordering::Relaxed);

        // One variant per resource.
        for other in EXTENSIONS.into_iter().filter(|ext| *ext != extension) {
            self.remove_file(&self.cache_path(id, other)).await;
        }

        debug!(id = %id, path = %path.display(), size = bytes.len(), "Stored image in disk cache");
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> bool {
        let size = fs::metadata(path).await.map(|m| m.len()).ok();
        match fs::remove_file(path).await {
            Ok(()) => {
                if let Some(s) = size {
                    self.current_size.fetch_sub(s, Ordering::Relaxed);
                    self.item_count.fetch_sub(1, Ordering::Relaxed);
                }
                true
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove cache file");
                }
                false
            }
        }
    }

    /// Removes every variant of an image from disk cache.
    pub async fn evict(&self, id: &ResourceId) {
        let mut removed = false;
        for extension in EXTENSIONS {
            removed |= self.remove_file(&self.cache_path(id, extension)).await;
        }
        if removed {
            debug!(id = %id, "Evicted from disk cache");
        }
    }

    /// Clears the entire disk cache.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> LoadResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| LoadError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LoadError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if is_entry(&path) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if an image is cached in any variant.
    pub async fn contains(&self, id: &ResourceId) -> bool {
        self.find(id).await.is_some()
    }
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("entries", &self.len())
            .field("size", &self.current_size())
            .finish_non_exhaustive()
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "oxipix", "oxipix").map_or_else(
        || std::env::temp_dir().join("oxipix").join("cache").join("images"),
        |dirs| dirs.cache_dir().join("images"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockRasterDecoderPort;
    use crate::infrastructure::image::decoder::fixtures;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(
            temp_dir.path().to_path_buf(),
            AnimatedDecoderFactory::default(),
        )
        .await
        .unwrap();
        (cache, temp_dir)
    }

    fn gif_bytes() -> Vec<u8> {
        fixtures::gif(3, 2, &[[255, 0, 0, 255], [0, 0, 255, 255]], 50)
    }

    #[tokio::test]
    async fn test_put_and_get_bytes() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("https://example.com/a.bin");
        let data = b"test image data";

        cache.put_bytes(&id, data).await.unwrap();
        let retrieved = cache.get_bytes(&id).await;

        assert_eq!(retrieved.unwrap().as_ref(), data);
        assert!(cache.cache_path(&id, STATIC_EXTENSION).exists());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("nonexistent");

        assert!(cache.get_bytes(&id).await.is_none());
        assert!(cache.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_static_round_trip() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("https://example.com/still.png");
        let mut pixels = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        pixels.put_pixel(1, 1, Rgba([200, 100, 0, 128]));
        let asset = ImageAsset::from_raster(DynamicImage::ImageRgba8(pixels));

        cache.put(&id, &asset).await.unwrap();
        let loaded = cache.get(&id).await.unwrap();

        assert_eq!(loaded, asset);
    }

    #[tokio::test]
    async fn test_get_decodes_through_raster_port() {
        let temp_dir = TempDir::new().unwrap();
        let mut raster = MockRasterDecoderPort::new();
        raster
            .expect_decode()
            .times(1)
            .returning(|_| Ok(DynamicImage::new_rgb8(7, 5)));
        let cache = DiskImageCache::new(
            temp_dir.path().to_path_buf(),
            AnimatedDecoderFactory::default(),
        )
        .await
        .unwrap()
        .with_raster_decoder(Arc::new(raster));
        let id = ResourceId::new("https://example.com/ported.png");

        cache.put_bytes(&id, b"opaque still bytes").await.unwrap();
        let loaded = cache.get(&id).await.unwrap();

        assert_eq!(loaded.dimensions(), (7, 5));
    }

    #[tokio::test]
    async fn test_animated_round_trip_keeps_container_bytes() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("https://example.com/anim.gif");
        let bytes = Bytes::from(gif_bytes());
        let animated = AnimatedDecoderFactory::default()
            .probe(bytes.clone(), AnimatedFormat::Gif)
            .unwrap();

        cache.put(&id, &ImageAsset::Animated(animated)).await.unwrap();
        let loaded = cache.get(&id).await.unwrap();

        let loaded = loaded.as_animated().unwrap();
        assert_eq!(loaded.bytes, bytes);
        assert_eq!(loaded.frame_count, 2);
        assert!(cache.cache_path(&id, "gif").exists());
    }

    #[tokio::test]
    async fn test_put_replaces_other_variant() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("https://example.com/switch");

        cache.put_bytes(&id, &gif_bytes()).await.unwrap();
        let still = ImageAsset::from_raster(DynamicImage::new_rgb8(2, 2));
        cache.put(&id, &still).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert!(!cache.cache_path(&id, "gif").exists());
        assert!(!cache.get(&id).await.unwrap().is_animated());
    }

    #[tokio::test]
    async fn test_no_temporary_files_left() {
        let (cache, temp) = create_test_cache().await;
        cache
            .put_bytes(&ResourceId::new("one"), b"data")
            .await
            .unwrap();

        let mut names = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap());
        assert!(names.all(|n| !n.ends_with(".tmp")));
    }

    #[tokio::test]
    async fn test_evict() {
        let (cache, _temp) = create_test_cache().await;
        let id = ResourceId::new("test1");

        cache.put_bytes(&id, b"test").await.unwrap();
        assert!(cache.contains(&id).await);

        cache.evict(&id).await;
        assert!(!cache.contains(&id).await);
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache().await;

        cache
            .put_bytes(&ResourceId::new("test1"), b"data1")
            .await
            .unwrap();
        cache
            .put_bytes(&ResourceId::new("test2"), b"data2")
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert!(cache.get_bytes(&ResourceId::new("test1")).await.is_none());
    }

    #[tokio::test]
    async fn test_atomic_counters_sync() {
        let (cache, _temp) = create_test_cache().await;

        assert_eq!(cache.current_size(), 0);
        assert!(cache.is_empty());

        cache
            .put_bytes(&ResourceId::new("test1"), b"hello")
            .await
            .unwrap();
        cache
            .put_bytes(&ResourceId::new("test2"), b"world!")
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        cache
            .put_bytes(&ResourceId::new("test1"), b"hey")
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);

        cache.evict(&ResourceId::new("test2")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_reopen_counts_existing_entries() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = DiskImageCache::new(
                temp_dir.path().to_path_buf(),
                AnimatedDecoderFactory::default(),
            )
            .await
            .unwrap();
            cache
                .put_bytes(&ResourceId::new("persisted"), b"12345")
                .await
                .unwrap();
        }

        let reopened = DiskImageCache::new(
            temp_dir.path().to_path_buf(),
            AnimatedDecoderFactory::default(),
        )
        .await
        .unwrap();

        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.current_size(), 5);
        assert!(reopened.contains(&ResourceId::new("persisted")).await);
    }
}
