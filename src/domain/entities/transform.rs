//! Transformation descriptors for static images.

use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Bytes of the descriptor digest kept in cache keys.
const TRANSFORM_DIGEST_LEN: usize = 8;

/// Default ring color for circle crops (opaque white).
pub const DEFAULT_BORDER_COLOR: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);

/// Transformation applied to a static raster before caching.
///
/// Animated assets pass through every descriptor unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransformDescriptor {
    /// No transformation.
    #[default]
    None,
    /// Clip to a rounded rectangle.
    RoundedCorners {
        /// Corner radius in pixels.
        radius: f32,
    },
    /// Crop to the inscribed circle of a centered square, with an optional ring.
    Circle {
        /// Ring width in pixels; zero disables the ring.
        border_width: f32,
        /// Ring color.
        border_color: image::Rgba<u8>,
    },
    /// Gaussian blur.
    Blur {
        /// Blur radius, clamped to `[0, 25]` when applied.
        radius: f32,
    },
}

impl TransformDescriptor {
    /// Canonical textual encoding. Floats are encoded by bit pattern so the
    /// result is stable across processes.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::RoundedCorners { radius } => format!("rounded:{:08x}", radius.to_bits()),
            Self::Circle {
                border_width,
                border_color,
            } => format!(
                "circle:{:08x}:{}",
                border_width.to_bits(),
                hex::encode(border_color.0)
            ),
            Self::Blur { radius } => format!("blur:{:08x}", radius.to_bits()),
        }
    }

    /// Deterministic hash of the descriptor.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..TRANSFORM_DIGEST_LEN])
    }

    /// Returns true for [`TransformDescriptor::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Error parsing a transform descriptor from text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transform '{input}': {reason}")]
pub struct ParseTransformError {
    input: String,
    reason: String,
}

impl ParseTransformError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn parse_number(input: &str, value: &str) -> Result<f32, ParseTransformError> {
    let number: f32 = value
        .parse()
        .map_err(|_| ParseTransformError::new(input, format!("'{value}' is not a number")))?;
    if !number.is_finite() || number < 0.0 {
        return Err(ParseTransformError::new(
            input,
            "value must be a non-negative number",
        ));
    }
    Ok(number)
}

fn parse_color(input: &str, value: &str) -> Result<image::Rgba<u8>, ParseTransformError> {
    let hex_str = value.trim_start_matches('#');
    let mut bytes = hex::decode(hex_str)
        .map_err(|_| ParseTransformError::new(input, format!("'{value}' is not a hex color")))?;
    match bytes.len() {
        3 => bytes.push(255),
        4 => {}
        _ => {
            return Err(ParseTransformError::new(
                input,
                "color must be #rrggbb or #rrggbbaa",
            ));
        }
    }
    Ok(image::Rgba([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parses `none`, `rounded:<radius>`, `circle[:<width>[:<#color>]]` and `blur[:<radius>]`.
impl FromStr for TransformDescriptor {
    type Err = ParseTransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        match (kind.as_str(), args.as_slice()) {
            ("none", []) => Ok(Self::None),
            ("rounded", [radius]) => Ok(Self::RoundedCorners {
                radius: parse_number(s, radius)?,
            }),
            ("circle", []) => Ok(Self::Circle {
                border_width: 0.0,
                border_color: DEFAULT_BORDER_COLOR,
            }),
            ("circle", [width]) => Ok(Self::Circle {
                border_width: parse_number(s, width)?,
                border_color: DEFAULT_BORDER_COLOR,
            }),
            ("circle", [width, color]) => Ok(Self::Circle {
                border_width: parse_number(s, width)?,
                border_color: parse_color(s, color)?,
            }),
            ("blur", []) => Ok(Self::Blur { radius: 15.0 }),
            ("blur", [radius]) => Ok(Self::Blur {
                radius: parse_number(s, radius)?,
            }),
            _ => Err(ParseTransformError::new(s, "unknown transform or arguments")),
        }
    }
}
