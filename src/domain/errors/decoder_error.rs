//! Animated decoder error types.

use thiserror::Error;

use crate::domain::entities::AnimatedFormat;

/// Animated decoder error variants.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum DecoderError {
    #[error("animated {format} decoding is not supported on this platform")]
    Unsupported { format: AnimatedFormat },

    #[error("decoder already released")]
    Released,

    #[error("malformed {format} container: {reason}")]
    Malformed {
        format: AnimatedFormat,
        reason: String,
    },

    #[error("failed to decode frame {index}: {reason}")]
    Frame { index: u32, reason: String },
}

impl DecoderError {
    /// Creates unsupported-platform error.
    #[must_use]
    pub const fn unsupported(format: AnimatedFormat) -> Self {
        Self::Unsupported { format }
    }

    /// Creates malformed container error.
    #[must_use]
    pub fn malformed(format: AnimatedFormat, reason: impl Into<String>) -> Self {
        Self::Malformed {
            format,
            reason: reason.into(),
        }
    }

    /// Creates frame decode error.
    #[must_use]
    pub fn frame(index: u32, reason: impl Into<String>) -> Self {
        Self::Frame {
            index,
            reason: reason.into(),
        }
    }

    /// Returns whether the decoder is unavailable on this platform.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Returns whether the decoder was used after release.
    /// This is a programming error, not a recoverable condition.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DecoderError::unsupported(AnimatedFormat::WebP).is_unsupported());
        assert!(DecoderError::Released.is_released());
        assert!(!DecoderError::malformed(AnimatedFormat::Gif, "eof").is_unsupported());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DecoderError::unsupported(AnimatedFormat::WebP).to_string(),
            "animated WebP decoding is not supported on this platform"
        );
        assert_eq!(
            DecoderError::frame(3, "truncated").to_string(),
            "failed to decode frame 3: truncated"
        );
    }
}
