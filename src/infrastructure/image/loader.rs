//! Async image loading orchestrator.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network, and a
//! single-flight registry for background prefetches.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{
    AnimatedImage, CacheKey, ImageAsset, ImageSource, LoadState, LoadedImage, ResourceId,
    TransformDescriptor,
};
use crate::domain::ports::{
    BlurPort, DownloaderPort, ImageCachePort, ImageLoaderPort, LoadError, LoadResult,
    RasterDecoderPort,
};

use super::codec::{ImageCrateBlur, ImageCrateDecoder};
use super::decoder::{AnimatedDecoder, AnimatedDecoderFactory};
use super::disk_cache::{DiskImageCache, default_cache_dir};
use super::downloader::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_READ_TIMEOUT,
    HttpDownloader,
};
use super::frame_pool::{DEFAULT_POOL_CAPACITY, FrameBufferPool};
use super::memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET_KB, MemoryImageCache};
use super::sniffer;
use super::transform::TransformPipeline;

/// Message sent when a prefetch finishes.
#[derive(Debug, Clone)]
pub struct ImageLoadedEvent {
    /// The resource that was loaded.
    pub id: ResourceId,
    /// Final state of the load.
    pub state: LoadState,
}

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Memory budget in kilobytes; the memory cache takes an eighth of it.
    pub memory_budget_kb: u64,
    /// Disk cache directory. `None` selects the platform cache dir.
    pub cache_dir: Option<PathBuf>,
    /// Buffers kept per frame size in the frame pool.
    pub frame_pool_capacity: usize,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout.
    pub read_timeout: Duration,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// Whether animated WebP playback is enabled.
    pub animated_webp: bool,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_budget_kb: DEFAULT_MEMORY_BUDGET_KB,
            cache_dir: None,
            frame_pool_capacity: DEFAULT_POOL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            animated_webp: true,
        }
    }
}

/// Shared state of one load. Cheap to clone into background tasks.
#[derive(Clone)]
struct LoadPipeline {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    downloader: Arc<dyn DownloaderPort>,
    raster: Arc<dyn RasterDecoderPort>,
    decoders: AnimatedDecoderFactory,
    transforms: TransformPipeline,
    disk_writes: TaskTracker,
}

impl LoadPipeline {
    async fn load(
        &self,
        id: &ResourceId,
        transform: &TransformDescriptor,
    ) -> LoadResult<LoadedImage> {
        let key = CacheKey::new(id, transform);

        if let Some(asset) = self.memory_cache.get(&key).await {
            return Ok(LoadedImage {
                key,
                asset,
                source: ImageSource::MemoryCache,
            });
        }

        if let Some(bytes) = self.disk_cache.get_bytes(id).await {
            match self.ingest(id, bytes).await {
                Ok(original) => {
                    let asset = self.transform(original, *transform).await?;
                    self.memory_cache.put(key.clone(), asset.clone()).await;
                    debug!(id = %id, source = "disk", "Image loaded successfully");
                    return Ok(LoadedImage {
                        key,
                        asset,
                        source: ImageSource::DiskCache,
                    });
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Discarding unreadable disk cache entry");
                    self.disk_cache.evict(id).await;
                }
            }
        }

        let bytes = self.downloader.fetch(id).await?;
        let original = self.ingest(id, bytes).await?;
        let asset = self.transform(original.clone(), *transform).await?;

        self.memory_cache.put(key.clone(), asset.clone()).await;

        let disk_cache = Arc::clone(&self.disk_cache);
        let id_for_disk = id.clone();
        self.disk_writes.spawn(async move {
            if let Err(e) = disk_cache.put(&id_for_disk, &original).await {
                warn!(id = %id_for_disk, error = %e, "Failed to cache to disk");
            }
        });

        debug!(id = %id, source = "network", "Image loaded successfully");

        Ok(LoadedImage {
            key,
            asset,
            source: ImageSource::Network,
        })
    }

    /// Turns downloaded or cached bytes into an asset. Animated containers
    /// only have their metadata extracted; anything the animated path rejects
    /// is retried as a still image through the raster port.
    async fn ingest(&self, id: &ResourceId, bytes: Bytes) -> LoadResult<ImageAsset> {
        if let Some(format) = sniffer::detect(&bytes) {
            match self.decoders.probe(bytes.clone(), format) {
                Ok(animated) => return Ok(ImageAsset::Animated(animated)),
                Err(e) if e.is_unsupported() => {
                    debug!(id = %id, format = %format, "Animated decode unsupported, decoding still frame");
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Animated parse failed, decoding still frame");
                }
            }
        }

        let raster = Arc::clone(&self.raster);
        let decoded = tokio::task::spawn_blocking(move || raster.decode(&bytes))
            .await
            .map_err(|e| LoadError::DecodeError(format!("Decode task panicked: {e}")))??;

        Ok(ImageAsset::from_raster(decoded))
    }

    async fn transform(
        &self,
        asset: ImageAsset,
        descriptor: TransformDescriptor,
    ) -> LoadResult<ImageAsset> {
        if descriptor.is_none() || asset.is_animated() {
            return Ok(asset);
        }

        let transforms = self.transforms.clone();
        tokio::task::spawn_blocking(move || transforms.apply(&asset, &descriptor))
            .await
            .map_err(|e| LoadError::DecodeError(format!("Transform task panicked: {e}")))
    }
}

/// A tracked background prefetch.
struct PrefetchJob {
    token: CancellationToken,
    generation: u64,
}

/// Orchestrates image loading from memory, disk, and network.
pub struct ImageLoader {
    pipeline: LoadPipeline,
    frame_pool: Arc<FrameBufferPool>,
    prefetches: Arc<Mutex<HashMap<ResourceId, PrefetchJob>>>,
    next_generation: AtomicU64,
    event_tx: Option<mpsc::UnboundedSender<ImageLoadedEvent>>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("memory_cache", &self.pipeline.memory_cache)
            .field("disk_cache", &self.pipeline.disk_cache)
            .field("decoders", &self.pipeline.decoders)
            .field("prefetching", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader with an HTTP downloader and the `image` crate
    /// raster capabilities.
    ///
    /// # Errors
    /// Returns error if the disk cache or HTTP client cannot be created.
    pub async fn new(config: ImageLoaderConfig) -> LoadResult<Self> {
        let decoders = AnimatedDecoderFactory::detect().with_animated_webp(config.animated_webp);
        let cache_dir = config.cache_dir.clone().unwrap_or_else(default_cache_dir);
        let disk_cache = Arc::new(DiskImageCache::new(cache_dir, decoders).await?);
        let downloader = HttpDownloader::new(
            config.connect_timeout,
            config.read_timeout,
            config.max_concurrent_downloads,
        )?;

        info!(
            memory_budget_kb = config.memory_budget_kb,
            animated_webp = decoders.supports(crate::domain::entities::AnimatedFormat::WebP),
            "Image loader ready"
        );

        Ok(Self::from_parts(
            Arc::new(MemoryImageCache::from_budget_kb(config.memory_budget_kb)),
            disk_cache,
            Arc::new(downloader),
            decoders,
        )
        .with_frame_pool(Arc::new(FrameBufferPool::new(config.frame_pool_capacity))))
    }

    /// Assembles a loader from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        memory_cache: Arc<MemoryImageCache>,
        disk_cache: Arc<DiskImageCache>,
        downloader: Arc<dyn DownloaderPort>,
        decoders: AnimatedDecoderFactory,
    ) -> Self {
        Self {
            pipeline: LoadPipeline {
                memory_cache,
                disk_cache,
                downloader,
                raster: Arc::new(ImageCrateDecoder),
                decoders,
                transforms: TransformPipeline::new(Some(Arc::new(ImageCrateBlur))),
                disk_writes: TaskTracker::new(),
            },
            frame_pool: Arc::new(FrameBufferPool::default()),
            prefetches: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            event_tx: None,
        }
    }

    /// Replaces the still-image decoder.
    #[must_use]
    pub fn with_raster_decoder(mut self, raster: Arc<dyn RasterDecoderPort>) -> Self {
        self.pipeline.raster = raster;
        self
    }

    /// Replaces the blur capability. `None` disables blurring.
    #[must_use]
    pub fn with_blur(mut self, blur: Option<Arc<dyn BlurPort>>) -> Self {
        self.pipeline.transforms = TransformPipeline::new(blur);
        self
    }

    /// Shares an existing frame pool.
    #[must_use]
    pub fn with_frame_pool(mut self, frame_pool: Arc<FrameBufferPool>) -> Self {
        self.frame_pool = frame_pool;
        self
    }

    /// Reports finished prefetches on `event_tx`.
    #[must_use]
    pub fn with_event_sender(mut self, event_tx: mpsc::UnboundedSender<ImageLoadedEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Loads an image, checking caches first.
    ///
    /// # Errors
    /// Returns error if the image cannot be fetched or decoded. Cache
    /// failures never surface here.
    pub async fn load(
        &self,
        id: &ResourceId,
        transform: &TransformDescriptor,
    ) -> LoadResult<LoadedImage> {
        self.pipeline.load(id, transform).await
    }

    /// Loads an image and folds the outcome into a [`LoadState`].
    pub async fn load_state(&self, id: &ResourceId, transform: &TransformDescriptor) -> LoadState {
        let state = LoadState::from(self.load(id, transform).await);
        if let LoadState::Error(message) = &state {
            debug!(id = %id, error = %message, "Image load failed");
        }
        state
    }

    /// Starts loading an image in the background.
    ///
    /// Returns false without doing anything if a prefetch for `id` is
    /// already in flight. Must be called within a Tokio runtime.
    pub fn prefetch(&self, id: ResourceId) -> bool {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut jobs = self.prefetches.lock();
            if jobs.contains_key(&id) {
                trace!(id = %id, "Prefetch already in flight");
                return false;
            }
            jobs.insert(
                id.clone(),
                PrefetchJob {
                    token: token.clone(),
                    generation,
                },
            );
        }

        let pipeline = self.pipeline.clone();
        let jobs = Arc::clone(&self.prefetches);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(LoadError::Cancelled),
                result = pipeline.load(&id, &TransformDescriptor::None) => result,
            };

            {
                let mut jobs = jobs.lock();
                if jobs.get(&id).is_some_and(|job| job.generation == generation) {
                    jobs.remove(&id);
                }
            }

            match &result {
                Ok(loaded) => debug!(id = %id, source = %loaded.source, "Prefetch complete"),
                Err(LoadError::Cancelled) => {
                    debug!(id = %id, "Prefetch cancelled");
                    return;
                }
                Err(e) => warn!(id = %id, error = %e, "Prefetch failed"),
            }

            if let Some(tx) = event_tx {
                let event = ImageLoadedEvent {
                    id,
                    state: result.into(),
                };
                if tx.send(event).is_err() {
                    trace!("Image event receiver dropped");
                }
            }
        });

        true
    }

    /// Prefetches multiple images. Returns how many new jobs were started.
    pub fn prefetch_batch(&self, ids: impl IntoIterator<Item = ResourceId>) -> usize {
        ids.into_iter().filter(|id| self.prefetch(id.clone())).count()
    }

    /// Cancels a pending prefetch.
    pub fn cancel_prefetch(&self, id: &ResourceId) {
        let job = self.prefetches.lock().remove(id);
        if let Some(job) = job {
            job.token.cancel();
            debug!(id = %id, "Cancelled prefetch");
        }
    }

    /// Cancels all pending prefetches.
    pub fn cancel_all(&self) {
        let jobs: Vec<_> = self.prefetches.lock().drain().collect();
        let count = jobs.len();
        for (_, job) in jobs {
            job.token.cancel();
        }
        if count > 0 {
            debug!(count = count, "Cancelled all pending prefetches");
        }
    }

    /// Returns true if a prefetch for `id` is in flight.
    #[must_use]
    pub fn is_prefetching(&self, id: &ResourceId) -> bool {
        self.prefetches.lock().contains_key(id)
    }

    /// Returns the number of prefetches in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.prefetches.lock().len()
    }

    /// Opens a playback decoder for a loaded animated asset.
    ///
    /// # Errors
    /// Returns `LoadError::UnsupportedPlatform` if the format cannot be
    /// played here, or `LoadError::DecodeError` for a malformed container.
    pub fn open_decoder(&self, asset: &AnimatedImage) -> LoadResult<Box<dyn AnimatedDecoder>> {
        self.pipeline.decoders.open(asset).map_err(|e| {
            if !e.is_unsupported() {
                error!(format = %asset.format, error = %e, "Failed to open animated decoder");
            }
            LoadError::from(e)
        })
    }

    /// Shared frame buffer pool for playback.
    #[must_use]
    pub fn frame_pool(&self) -> Arc<FrameBufferPool> {
        Arc::clone(&self.frame_pool)
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.pipeline.memory_cache.stats()
    }

    /// Number of entries in the disk cache.
    #[must_use]
    pub fn disk_cache_len(&self) -> usize {
        self.pipeline.disk_cache.len()
    }

    /// Bytes used by the disk cache.
    #[must_use]
    pub fn disk_cache_size(&self) -> u64 {
        self.pipeline.disk_cache.current_size()
    }

    /// Waits for background disk writes started so far.
    pub async fn flush(&self) {
        let writes = &self.pipeline.disk_writes;
        writes.close();
        writes.wait().await;
        writes.reopen();
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.flush().await;
        self.pipeline.memory_cache.clear().await;
        if let Err(e) = self.pipeline.disk_cache.clear().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
        self.frame_pool.clear();
        info!("Cleared all image caches");
    }
}

#[async_trait::async_trait]
impl ImageLoaderPort for ImageLoader {
    async fn load(
        &self,
        id: &ResourceId,
        transform: &TransformDescriptor,
    ) -> LoadResult<LoadedImage> {
        Self::load(self, id, transform).await
    }

    fn prefetch(&self, id: ResourceId) -> bool {
        Self::prefetch(self, id)
    }

    fn cancel_prefetch(&self, id: &ResourceId) {
        Self::cancel_prefetch(self, id);
    }
}
