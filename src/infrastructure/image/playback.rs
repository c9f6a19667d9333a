//! Frame advancement loop for animated assets.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, trace, warn};

use super::decoder::AnimatedDecoder;
use super::frame_pool::FrameBufferPool;
use crate::domain::entities::{FrameBuffer, PixelFormat};
use crate::domain::errors::DecoderError;

/// Shortest delay between frames, capping playback at roughly 60 Hz.
pub const MIN_FRAME_DELAY: Duration = Duration::from_millis(16);

/// Outcome of a finished playback task.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSummary {
    /// Frames handed to the sink.
    pub frames_rendered: u64,
    /// Error that ended playback early, if any.
    pub error: Option<DecoderError>,
}

/// Handle to a running playback task.
///
/// Dropping the handle stops playback; the task still releases its buffer
/// and decoder on the way out.
#[derive(Debug)]
pub struct PlaybackHandle {
    token: CancellationToken,
    join: JoinHandle<PlaybackSummary>,
    _stop_on_drop: DropGuard,
}

impl PlaybackHandle {
    /// Returns true once the task has stopped on its own or been stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops playback and waits for the decoder and buffer to be released.
    pub async fn stop(self) -> PlaybackSummary {
        self.token.cancel();
        self.wait().await
    }

    /// Waits for playback to end without stopping it. Looping animations
    /// only end through [`PlaybackHandle::stop`] or an error.
    pub async fn wait(self) -> PlaybackSummary {
        match self.join.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Playback task failed");
                PlaybackSummary::default()
            }
        }
    }
}

/// Index that follows `index`, or None when a non-looping animation ends.
const fn next_index(index: u32, frame_count: u32, looping: bool) -> Option<u32> {
    let next = index + 1;
    if next < frame_count {
        Some(next)
    } else if looping {
        Some(0)
    } else {
        None
    }
}

/// Spawns a task that decodes frames on the blocking pool and hands each to
/// `sink` with its index.
///
/// Frames render at the decoder's intrinsic size unless `size` is given.
/// The task owns the decoder; on exit it returns the frame buffer to `pool`
/// and releases the decoder.
pub fn spawn_playback<F>(
    decoder: Box<dyn AnimatedDecoder>,
    pool: Arc<FrameBufferPool>,
    size: Option<(u32, u32)>,
    mut sink: F,
) -> PlaybackHandle
where
    F: FnMut(&FrameBuffer, u32) + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let (width, height) = size.unwrap_or((decoder.width(), decoder.height()));

    let join = tokio::spawn(async move {
        let frame_count = decoder.frame_count().max(1);
        let looping = decoder.is_looping();
        let format = decoder.format();
        let mut summary = PlaybackSummary::default();
        let mut state = Some((decoder, pool.acquire(width, height, PixelFormat::Rgba8)));
        let mut index = 0u32;

        debug!(format = %format, frame_count, looping, width, height, "Playback started");

        loop {
            if cancelled.is_cancelled() {
                break;
            }
            let Some((mut decoder, mut buffer)) = state.take() else {
                break;
            };

            let decoded = tokio::task::spawn_blocking(move || {
                let result = decoder.decode_frame(index, &mut buffer);
                (decoder, buffer, result)
            })
            .await;

            let (decoder, buffer, result) = match decoded {
                Ok(parts) => parts,
                Err(e) => {
                    error!(error = %e, "Frame decode task panicked");
                    break;
                }
            };

            let duration_ms = match result {
                Ok(duration_ms) => duration_ms,
                Err(e) => {
                    if e.is_released() {
                        error!(format = %format, "Frame requested from a released decoder");
                    } else {
                        warn!(format = %format, index, error = %e, "Frame decode failed");
                    }
                    summary.error = Some(e);
                    state = Some((decoder, buffer));
                    break;
                }
            };

            sink(&buffer, index);
            summary.frames_rendered += 1;
            trace!(index, duration_ms, "Frame rendered");
            state = Some((decoder, buffer));

            let Some(next) = next_index(index, frame_count, looping) else {
                break;
            };
            index = next;

            let delay = Duration::from_millis(duration_ms).max(MIN_FRAME_DELAY);
            tokio::select! {
                () = cancelled.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        if let Some((mut decoder, buffer)) = state {
            pool.release(buffer);
            decoder.release();
        }

        debug!(
            format = %format,
            frames = summary.frames_rendered,
            "Playback stopped"
        );
        summary
    });

    PlaybackHandle {
        _stop_on_drop: token.clone().drop_guard(),
        token,
        join,
    }
}
