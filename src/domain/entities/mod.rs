//! Domain entity definitions.

mod frame;
mod image;
mod transform;

pub use frame::{FrameBuffer, PixelFormat};
pub use image::{
    AnimatedFormat, AnimatedImage, CacheKey, ImageAsset, ImageSource, LoadState, LoadedImage,
    ResourceId,
};
pub use transform::{DEFAULT_BORDER_COLOR, ParseTransformError, TransformDescriptor};
