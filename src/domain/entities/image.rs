//! Domain types for image loading.

use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::transform::TransformDescriptor;
use crate::domain::ports::LoadResult;

/// Number of digest bytes kept when hashing identifiers for file names.
const DIGEST_PREFIX_LEN: usize = 16;

/// Remote resource identifier (a URL).
/// Identity for network fetches and disk persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a new `ResourceId` from any string-like input.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a stable hex digest of the identifier, used as the disk file stem.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..DIGEST_PREFIX_LEN])
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identifies a post-transform asset in the memory cache.
///
/// Two different transforms of the same resource always produce different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: ResourceId,
    transform_hash: String,
}

impl CacheKey {
    /// Builds the key for `resource` after applying `transform`.
    #[must_use]
    pub fn new(resource: &ResourceId, transform: &TransformDescriptor) -> Self {
        Self {
            resource: resource.clone(),
            transform_hash: transform.digest(),
        }
    }

    /// Returns the underlying resource identifier.
    #[must_use]
    pub const fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Returns the transform descriptor hash.
    #[must_use]
    pub fn transform_hash(&self) -> &str {
        &self.transform_hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.resource, self.transform_hash)
    }
}

/// Animated container formats the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimatedFormat {
    /// Graphics Interchange Format.
    Gif,
    /// Animated WebP (VP8X with the animation flag).
    WebP,
}

impl AnimatedFormat {
    /// All formats, in disk probe order.
    pub const ALL: [Self; 2] = [Self::Gif, Self::WebP];

    /// File extension used when persisting the original container.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for AnimatedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gif => write!(f, "GIF"),
            Self::WebP => write!(f, "WebP"),
        }
    }
}

/// Raw animated container plus metadata extracted once at ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedImage {
    /// Original container bytes.
    pub bytes: Bytes,
    /// Container format.
    pub format: AnimatedFormat,
    /// Frame count (exact or estimated, see the decoder).
    pub frame_count: u32,
    /// Intrinsic canvas width.
    pub width: u32,
    /// Intrinsic canvas height.
    pub height: u32,
}

/// A decoded visual asset.
#[derive(Clone, PartialEq)]
pub enum ImageAsset {
    /// A single decoded raster.
    Static {
        /// Decoded pixels.
        raster: Arc<image::DynamicImage>,
    },
    /// An animated container decoded lazily at playback time.
    Animated(AnimatedImage),
}

impl ImageAsset {
    /// Wraps a decoded raster.
    #[must_use]
    pub fn from_raster(raster: image::DynamicImage) -> Self {
        Self::Static {
            raster: Arc::new(raster),
        }
    }

    /// Returns true for animated assets.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        matches!(self, Self::Animated(_))
    }

    /// Returns the intrinsic dimensions.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Static { raster } => (raster.width(), raster.height()),
            Self::Animated(anim) => (anim.width, anim.height),
        }
    }

    /// Size accounted against the memory budget.
    ///
    /// Static assets count decoded pixel bytes; animated assets count
    /// compressed container bytes. The two units are not comparable.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Static { raster } => raster.as_bytes().len(),
            Self::Animated(anim) => anim.bytes.len(),
        }
    }

    /// Returns the raster of a static asset.
    #[must_use]
    pub const fn as_static(&self) -> Option<&Arc<image::DynamicImage>> {
        match self {
            Self::Static { raster } => Some(raster),
            Self::Animated(_) => None,
        }
    }

    /// Returns the container of an animated asset.
    #[must_use]
    pub const fn as_animated(&self) -> Option<&AnimatedImage> {
        match self {
            Self::Static { .. } => None,
            Self::Animated(anim) => Some(anim),
        }
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static { raster } => f
                .debug_struct("Static")
                .field("width", &raster.width())
                .field("height", &raster.height())
                .field("color", &raster.color())
                .finish(),
            Self::Animated(anim) => f
                .debug_struct("Animated")
                .field("format", &anim.format)
                .field("frame_count", &anim.frame_count)
                .field("width", &anim.width)
                .field("height", &anim.height)
                .field("bytes", &anim.bytes.len())
                .finish(),
        }
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from in-memory LRU cache.
    MemoryCache,
    /// Loaded from disk cache.
    DiskCache,
    /// Downloaded from network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully loaded asset.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Memory cache key of the transformed asset.
    pub key: CacheKey,
    /// The transformed asset.
    pub asset: ImageAsset,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// Observable per-request state. Never persisted.
#[derive(Debug, Clone, Default)]
pub enum LoadState {
    /// The request is in flight.
    #[default]
    Loading,
    /// The asset is ready.
    Success(LoadedImage),
    /// Loading failed with an error message.
    Error(String),
}

impl LoadState {
    /// Returns true while loading.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true if the asset is ready.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the loaded image, if any.
    #[must_use]
    pub const fn loaded(&self) -> Option<&LoadedImage> {
        match self {
            Self::Success(loaded) => Some(loaded),
            _ => None,
        }
    }
}

impl From<LoadResult<LoadedImage>> for LoadState {
    fn from(result: LoadResult<LoadedImage>) -> Self {
        match result {
            Ok(loaded) => Self::Success(loaded),
            Err(e) => Self::Error(e.to_string()),
        }
    }
}
