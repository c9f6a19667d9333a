//! Port definition for image caching and loading.

use crate::domain::entities::{CacheKey, ImageAsset, LoadedImage, ResourceId, TransformDescriptor};
use crate::domain::errors::DecoderError;

/// Result type for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while loading an image.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// Timeout, connection failure or non-success HTTP status.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Failed to decode image.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// The animated format cannot be decoded on this runtime.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
    /// A decoder was used after release.
    #[error("Decoder used after release")]
    DecoderReleased,
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// The load was cancelled before completion.
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Returns whether the error came from the network tier.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Returns whether the error indicates a missing platform capability.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform(_))
    }
}

impl From<DecoderError> for LoadError {
    fn from(err: DecoderError) -> Self {
        match err {
            DecoderError::Unsupported { .. } => Self::UnsupportedPlatform(err.to_string()),
            DecoderError::Released => Self::DecoderReleased,
            DecoderError::Malformed { .. } | DecoderError::Frame { .. } => {
                Self::DecodeError(err.to_string())
            }
        }
    }
}

/// Port for in-process caching of decoded assets.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an asset from the cache.
    /// Returns None if not cached.
    async fn get(&self, key: &CacheKey) -> Option<ImageAsset>;

    /// Stores an asset in the cache. Existing entries are kept.
    async fn put(&self, key: CacheKey, asset: ImageAsset);

    /// Removes an asset from the cache.
    async fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached assets.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all assets from the cache.
    async fn clear(&self);
}

/// Port for loading images from the cache tiers and the network.
#[async_trait::async_trait]
pub trait ImageLoaderPort: Send + Sync {
    /// Loads an image, checking caches first then network.
    /// Returns the loaded image with source information.
    async fn load(
        &self,
        id: &ResourceId,
        transform: &TransformDescriptor,
    ) -> LoadResult<LoadedImage>;

    /// Prefetches an image into cache without blocking.
    /// Returns false if a prefetch for the same resource is already in flight.
    fn prefetch(&self, id: ResourceId) -> bool;

    /// Cancels any pending prefetch for the given resource.
    fn cancel_prefetch(&self, id: &ResourceId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AnimatedFormat;

    #[test]
    fn test_decoder_error_conversion() {
        let unsupported: LoadError = DecoderError::unsupported(AnimatedFormat::WebP).into();
        assert!(unsupported.is_unsupported());

        let released: LoadError = DecoderError::Released.into();
        assert!(matches!(released, LoadError::DecoderReleased));

        let malformed: LoadError = DecoderError::malformed(AnimatedFormat::Gif, "eof").into();
        assert!(matches!(malformed, LoadError::DecodeError(_)));
        assert!(!malformed.is_network_error());
    }
}
