//! Domain layer with core image entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{AnimatedFormat, CacheKey, ImageAsset, ResourceId, TransformDescriptor};
pub use errors::DecoderError;
pub use ports::{LoadError, LoadResult};
