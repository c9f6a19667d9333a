//! Pixel buffers used for animated frame playback.

/// Pixel layout of a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit RGBA, straight alpha.
    #[default]
    Rgba8,
    /// 8-bit RGB, composited over black.
    Rgb8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
        }
    }
}

/// A fixed-size, caller-owned pixel surface.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer.
    #[must_use]
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: vec![0; Self::expected_len(width, height, format)],
        }
    }

    fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }

    /// Buffer width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Moves the pixel storage out, leaving the buffer invalid.
    /// Invalid buffers are discarded instead of pooled.
    pub fn take_pixels(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pixels)
    }

    /// True when the storage still matches the declared geometry.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == Self::expected_len(self.width, self.height, self.format)
    }

    /// Resets every pixel to transparent black.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Writes one straight-alpha RGBA pixel, converting to the buffer format.
    /// Out-of-bounds writes are ignored.
    pub fn put_rgba(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let Some(dst) = self.pixels.get_mut(offset..offset + bpp) else {
            return;
        };
        match self.format {
            PixelFormat::Rgba8 => dst.copy_from_slice(&rgba),
            PixelFormat::Rgb8 => {
                let alpha = u16::from(rgba[3]);
                for (d, s) in dst.iter_mut().zip(rgba.iter()) {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        *d = ((u16::from(*s) * alpha + 127) / 255) as u8;
                    }
                }
            }
        }
    }

    /// Reads one pixel as RGBA. Rgb8 buffers report opaque alpha.
    #[must_use]
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let src = self.pixels.get(offset..offset + bpp)?;
        match self.format {
            PixelFormat::Rgba8 => Some([src[0], src[1], src[2], src[3]]),
            PixelFormat::Rgb8 => Some([src[0], src[1], src[2], 255]),
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_zeroed_and_valid() {
        let buf = FrameBuffer::new(4, 3, PixelFormat::Rgba8);
        assert_eq!(buf.pixels().len(), 48);
        assert!(buf.is_valid());
        assert!(buf.pixels().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_take_pixels_invalidates() {
        let mut buf = FrameBuffer::new(2, 2, PixelFormat::Rgb8);
        let raw = buf.take_pixels();
        assert_eq!(raw.len(), 12);
        assert!(!buf.is_valid());
    }

    #[test]
    fn test_rgb8_composites_over_black() {
        let mut buf = FrameBuffer::new(1, 1, PixelFormat::Rgb8);
        buf.put_rgba(0, 0, [200, 100, 50, 0]);
        assert_eq!(buf.rgba_at(0, 0), Some([0, 0, 0, 255]));

        buf.put_rgba(0, 0, [200, 100, 50, 255]);
        assert_eq!(buf.rgba_at(0, 0), Some([200, 100, 50, 255]));
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut buf = FrameBuffer::new(2, 2, PixelFormat::Rgba8);
        buf.put_rgba(5, 0, [1, 2, 3, 4]);
        assert_eq!(buf.rgba_at(5, 0), None);
        assert!(buf.pixels().iter().all(|b| *b == 0));
    }
}
