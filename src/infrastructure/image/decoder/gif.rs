//! GIF container walker and decoder.

use std::io::Cursor;

use bytes::Bytes;
use image::AnimationDecoder;

use super::{AnimatedDecoder, ContainerInfo, FrameWindow, draw_scaled};
use crate::domain::entities::{AnimatedFormat, FrameBuffer};
use crate::domain::errors::DecoderError;

const HEADER_LEN: usize = 6;
const SCREEN_DESCRIPTOR_END: usize = 13;
const IMAGE_DESCRIPTOR_LEN: usize = 10;

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;
const NETSCAPE_ID: &[u8] = b"NETSCAPE2.0";

/// Milliseconds per frame assumed when estimating the frame count from duration.
const ESTIMATED_FRAME_MS: u64 = 100;

/// Result of walking the block structure.
#[derive(Debug, Default)]
struct GifWalk {
    width: u32,
    height: u32,
    frames: u32,
    duration_ms: u64,
    loop_extension: bool,
    complete: bool,
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        0
    } else {
        3 * (1 << ((packed & 0x07) + 1))
    }
}

/// Skips a chain of data sub-blocks starting at `pos`.
/// Returns the position after the terminator.
fn skip_sub_blocks(bytes: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let size = usize::from(*bytes.get(pos)?);
        pos += 1;
        if size == 0 {
            return Some(pos);
        }
        pos += size;
    }
}

fn walk(bytes: &[u8]) -> Result<GifWalk, DecoderError> {
    if bytes.len() < SCREEN_DESCRIPTOR_END || !bytes.starts_with(b"GIF") {
        return Err(DecoderError::malformed(
            AnimatedFormat::Gif,
            "missing logical screen descriptor",
        ));
    }
    if &bytes[3..HEADER_LEN] != b"87a" && &bytes[3..HEADER_LEN] != b"89a" {
        return Err(DecoderError::malformed(
            AnimatedFormat::Gif,
            "unknown version",
        ));
    }

    let mut walk = GifWalk {
        width: u32::from(u16::from_le_bytes([bytes[6], bytes[7]])),
        height: u32::from(u16::from_le_bytes([bytes[8], bytes[9]])),
        ..GifWalk::default()
    };

    let mut pos = SCREEN_DESCRIPTOR_END + color_table_len(bytes[10]);
    let mut pending_delay_ms = 0u64;

    while let Some(&block) = bytes.get(pos) {
        match block {
            EXTENSION_INTRODUCER => {
                let Some(&label) = bytes.get(pos + 1) else {
                    break;
                };
                match label {
                    GRAPHIC_CONTROL_LABEL => {
                        if let Some(delay) = bytes.get(pos + 4..pos + 6) {
                            pending_delay_ms = u64::from(u16::from_le_bytes([delay[0], delay[1]])) * 10;
                        }
                    }
                    APPLICATION_LABEL => {
                        if bytes.get(pos + 3..pos + 3 + NETSCAPE_ID.len()) == Some(NETSCAPE_ID) {
                            walk.loop_extension = true;
                        }
                    }
                    _ => {}
                }
                let Some(next) = skip_sub_blocks(bytes, pos + 2) else {
                    break;
                };
                pos = next;
            }
            IMAGE_SEPARATOR => {
                let Some(&packed) = bytes.get(pos + IMAGE_DESCRIPTOR_LEN - 1) else {
                    break;
                };
                walk.frames += 1;
                walk.duration_ms += pending_delay_ms;
                pending_delay_ms = 0;

                // Descriptor, local color table, LZW minimum code size, data.
                let data_start = pos + IMAGE_DESCRIPTOR_LEN + color_table_len(packed) + 1;
                let Some(next) = skip_sub_blocks(bytes, data_start) else {
                    break;
                };
                pos = next;
            }
            TRAILER => {
                walk.complete = true;
                break;
            }
            _ => break,
        }
    }

    Ok(walk)
}

/// Counts image separator bytes. A rough fallback when the block walk fails.
fn count_separators(bytes: &[u8]) -> u32 {
    let count = bytes.iter().filter(|b| **b == IMAGE_SEPARATOR).count();
    u32::try_from(count).unwrap_or(u32::MAX).max(1)
}

fn container_info(bytes: &[u8]) -> Result<(ContainerInfo, bool), DecoderError> {
    let walk = walk(bytes)?;

    let frame_count = if walk.complete && walk.frames > 0 {
        walk.frames
    } else if walk.duration_ms > 0 {
        u32::try_from(walk.duration_ms / ESTIMATED_FRAME_MS)
            .unwrap_or(u32::MAX)
            .max(1)
    } else {
        count_separators(bytes)
    };

    let info = ContainerInfo {
        width: walk.width,
        height: walk.height,
        frame_count,
        duration_ms: walk.duration_ms,
        looping: true,
    };
    Ok((info, walk.loop_extension))
}

/// Lazy GIF decoder over borrowed container bytes.
///
/// Playback always loops. The NETSCAPE2.0 extension is reported separately.
pub struct GifDecoder {
    bytes: Bytes,
    info: ContainerInfo,
    loop_extension: bool,
    window: FrameWindow,
    released: bool,
}

impl GifDecoder {
    /// Parses container metadata.
    ///
    /// # Errors
    /// Returns `DecoderError::Malformed` if the header is not a GIF.
    pub fn new(bytes: Bytes) -> Result<Self, DecoderError> {
        let (info, loop_extension) = container_info(&bytes)?;
        Ok(Self {
            bytes,
            info,
            loop_extension,
            window: FrameWindow::new(info.width, info.height),
            released: false,
        })
    }

    /// Whether the container carries a NETSCAPE2.0 loop extension.
    #[must_use]
    pub const fn has_loop_extension(&self) -> bool {
        self.loop_extension
    }

    fn open_frames(bytes: &Bytes) -> Result<image::Frames<'static>, DecoderError> {
        let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(bytes.clone()))
            .map_err(|e| DecoderError::malformed(AnimatedFormat::Gif, e.to_string()))?;
        Ok(decoder.into_frames())
    }
}

impl AnimatedDecoder for GifDecoder {
    fn format(&self) -> AnimatedFormat {
        AnimatedFormat::Gif
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

impl std::fmt::Debug for GifDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifDecoder")
            .field("info", &self.info)
            .field("loop_extension", &self.loop_extension)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
