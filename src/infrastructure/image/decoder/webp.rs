//! Animated WebP chunk walker and decoder.

use std::io::Cursor;

use bytes::Bytes;
use image::AnimationDecoder;

use super::{AnimatedDecoder, ContainerInfo, FrameWindow, draw_scaled};
use crate::domain::entities::{AnimatedFormat, FrameBuffer};
use crate::domain::errors::DecoderError;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Frame estimate when no frame chunk can be parsed.
const ESTIMATED_FRAME_COUNT: u32 = 20;
/// Duration estimate when no frame chunk can be parsed.
const ESTIMATED_DURATION_MS: u64 = 2000;

fn read_u24(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 3)?;
    Some(u32::from(raw[0]) | (u32::from(raw[1]) << 8) | (u32::from(raw[2]) << 16))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[derive(Debug, Default)]
struct WebPWalk {
    canvas: Option<(u32, u32)>,
    loop_count: Option<u16>,
    frames: u32,
    duration_ms: u64,
}

fn walk(bytes: &[u8]) -> WebPWalk {
    let mut walk = WebPWalk::default();
    let mut offset = RIFF_HEADER_LEN;

    while offset + CHUNK_HEADER_LEN <= bytes.len() {
        let fourcc = &bytes[offset..offset + 4];
        let Some(size) = read_u32(bytes, offset + 4).and_then(|s| usize::try_from(s).ok()) else {
            break;
        };
        let payload = offset + CHUNK_HEADER_LEN;

        match fourcc {
            b"VP8X" => {
                if let (Some(w), Some(h)) = (read_u24(bytes, payload + 4), read_u24(bytes, payload + 7)) {
                    walk.canvas = Some((w + 1, h + 1));
                }
            }
            b"ANIM" => {
                if let Some(raw) = bytes.get(payload + 4..payload + 6) {
                    walk.loop_count = Some(u16::from_le_bytes([raw[0], raw[1]]));
                }
            }
            b"ANMF" => {
                walk.frames += 1;
                if let Some(duration) = read_u24(bytes, payload + 12) {
                    walk.duration_ms += u64::from(duration);
                }
            }
            _ => {}
        }

        // Chunks are padded to an even size.
        let Some(next) = payload
            .checked_add(size)
            .and_then(|end| end.checked_add(size % 2))
        else {
            break;
        };
        offset = next;
    }

    walk
}

/// Lazy animated WebP decoder over borrowed container bytes.
pub struct WebPDecoder {
    bytes: Bytes,
    info: ContainerInfo,
    loop_count: u16,
    window: FrameWindow,
    released: bool,
}

impl WebPDecoder {
    /// Parses container metadata.
    ///
    /// # Errors
    /// Returns `DecoderError::Malformed` if the RIFF header or the VP8X canvas
    /// chunk is missing.
    pub fn new(bytes: Bytes) -> Result<Self, DecoderError> {
        if bytes.len() < RIFF_HEADER_LEN || !bytes.starts_with(b"RIFF") || &bytes[8..12] != b"WEBP" {
            return Err(DecoderError::malformed(
                AnimatedFormat::WebP,
                "missing RIFF/WEBP header",
            ));
        }

        let walk = walk(&bytes);
        let Some((width, height)) = walk.canvas else {
            return Err(DecoderError::malformed(
                AnimatedFormat::WebP,
                "missing VP8X canvas chunk",
            ));
        };

        let (frame_count, duration_ms) = if walk.frames > 0 {
            (walk.frames, walk.duration_ms)
        } else {
            (ESTIMATED_FRAME_COUNT, ESTIMATED_DURATION_MS)
        };

        Ok(Self {
            bytes,
            info: ContainerInfo {
                width,
                height,
                frame_count,
                duration_ms,
                looping: true,
            },
            loop_count: walk.loop_count.unwrap_or(0),
            window: FrameWindow::new(width, height),
            released: false,
        })
    }

    /// Loop count stored in the ANIM chunk; zero means forever.
    /// Playback always loops regardless of this value.
    #[must_use]
    pub const fn loop_count(&self) -> u16 {
        self.loop_count
    }

    fn open_frames(bytes: &Bytes) -> Result<image::Frames<'static>, DecoderError> {
        let decoder = image::codecs::webp::WebPDecoder::new(Cursor::new(bytes.clone()))
            .map_err(|e| DecoderError::malformed(AnimatedFormat::WebP, e.to_string()))?;
        Ok(decoder.into_frames())
    }
}

impl AnimatedDecoder for WebPDecoder {
    fn format(&self) -> AnimatedFormat {
        AnimatedFormat::WebP
    }

    fn width(&self) -> u32 {
        self.info.width
    }

    fn height(&self) -> u32 {
        self.info.height
    }

    fn frame_count(&self) -> u32 {
        self.info.frame_count
    }

    fn duration(&self) -> u64 {
        self.info.duration_ms
    }

    fn is_looping(&self) -> bool {
        self.info.looping
    }

    fn frame_duration(&self, _index: u32) -> u64 {
        self.info.average_frame_duration()
    }

    fn decode_frame(&mut self, index: u32, output: &mut FrameBuffer) -> Result<u64, DecoderError> {
        if self.released {
            return Err(DecoderError::Released);
        }

        let frame_index = self.info.frame_index(index);
        let bytes = &self.bytes;
        let frame = self.window.frame(frame_index, || Self::open_frames(bytes))?;
        draw_scaled(frame, output);

        Ok(self.frame_duration(frame_index))
    }

    fn release(&mut self) {
        self.released = true;
        self.window.clear();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl std::fmt::Debug for WebPDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPDecoder")
            .field("info", &self.info)
            .field("loop_count", &self.loop_count)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
