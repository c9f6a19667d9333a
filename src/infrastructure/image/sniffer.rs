//! Animated container detection by byte signature.

use crate::domain::entities::AnimatedFormat;

/// Shortest buffer that can be classified.
pub const MIN_SNIFF_LEN: usize = 12;

/// Offset of the VP8X feature flags byte.
const WEBP_FLAGS_OFFSET: usize = 20;

/// Animation bit in the VP8X feature flags.
const WEBP_ANIMATION_FLAG: u8 = 0x02;

/// Classifies `bytes` as one of the animated formats.
///
/// Returns None for short buffers and for anything that should go through
/// static raster decoding, including WebP files without the animation flag.
#[must_use]
pub fn detect(bytes: &[u8]) -> Option<AnimatedFormat> {
    if bytes.len() < MIN_SNIFF_LEN {
        return None;
    }

    if bytes.starts_with(b"GIF") {
        return Some(AnimatedFormat::Gif);
    }

    if bytes.starts_with(b"RIFF")
        && &bytes[8..12] == b"WEBP"
        && bytes
            .get(WEBP_FLAGS_OFFSET)
            .is_some_and(|flags| flags & WEBP_ANIMATION_FLAG != 0)
    {
        return Some(AnimatedFormat::WebP);
    }

    None
}
