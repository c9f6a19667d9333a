//! Recycling pool for animation frame buffers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::{FrameBuffer, PixelFormat};

/// Buffers kept per `(width, height, format)` key.
pub const DEFAULT_POOL_CAPACITY: usize = 6;

type PoolKey = (u32, u32, PixelFormat);

/// Thread-safe pool of reusable frame buffers.
///
/// `acquire` and `release` may be called concurrently from any task. A buffer is
/// moved in and out of the pool, so it can never sit in two queues at once.
pub struct FrameBufferPool {
    queues: Mutex<HashMap<PoolKey, VecDeque<FrameBuffer>>>,
    capacity: usize,
    allocations: AtomicU64,
    reuses: AtomicU64,
    discards: AtomicU64,
}

impl FrameBufferPool {
    /// Creates a pool holding up to `capacity` buffers per key.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity,
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            discards: AtomicU64::new(0),
        }
    }

    /// Maximum buffers kept per key.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a cleared buffer of the requested geometry, reusing a pooled one
    /// when available.
    pub fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> FrameBuffer {
        let pooled = {
            let mut queues = self.queues.lock();
            queues
                .get_mut(&(width, height, format))
                .and_then(VecDeque::pop_front)
        };

        if let Some(mut buffer) = pooled.filter(FrameBuffer::is_valid) {
            buffer.clear();
            self.reuses.fetch_add(1, Ordering::Relaxed);
            trace!(width, height, ?format, "Reused pooled frame buffer");
            return buffer;
        }

        self.allocations.fetch_add(1, Ordering::Relaxed);
        trace!(width, height, ?format, "Allocated frame buffer");
        FrameBuffer::new(width, height, format)
    }

    /// Returns a buffer to the pool. Invalid buffers and buffers beyond the
    /// per-key capacity are dropped.
    pub fn release(&self, buffer: FrameBuffer) {
        if !buffer.is_valid() {
            self.discards.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let key = (buffer.width(), buffer.height(), buffer.format());
        let mut queues = self.queues.lock();
        let queue = queues.entry(key).or_default();
        if queue.len() < self.capacity {
            queue.push_back(buffer);
        } else {
            self.discards.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of pooled buffers for a key.
    #[must_use]
    pub fn pooled(&self, width: u32, height: u32, format: PixelFormat) -> usize {
        self.queues
            .lock()
            .get(&(width, height, format))
            .map_or(0, VecDeque::len)
    }

    /// Drops every pooled buffer.
    pub fn clear(&self) {
        self.queues.lock().clear();
    }

    /// Returns pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let pooled = self.queues.lock().values().map(VecDeque::len).sum();
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
            pooled,
        }
    }
}

impl Default for FrameBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl std::fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Frame pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Fresh allocations.
    pub allocations: u64,
    /// Buffers handed out from the pool.
    pub reuses: u64,
    /// Released buffers that were dropped.
    pub discards: u64,
    /// Buffers currently pooled.
    pub pooled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_then_acquire_reuses() {
        let pool = FrameBufferPool::default();
        let mut buffer = pool.acquire(8, 8, PixelFormat::Rgba8);
        buffer.put_rgba(0, 0, [9, 9, 9, 9]);
        pool.release(buffer);

        let reused = pool.acquire(8, 8, PixelFormat::Rgba8);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(reused.rgba_at(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_keys_do_not_mix() {
        let pool = FrameBufferPool::default();
        pool.release(FrameBuffer::new(8, 8, PixelFormat::Rgba8));

        let other_size = pool.acquire(8, 9, PixelFormat::Rgba8);
        let other_format = pool.acquire(8, 8, PixelFormat::Rgb8);

        assert_eq!(other_size.height(), 9);
        assert_eq!(other_format.format(), PixelFormat::Rgb8);
        assert_eq!(pool.stats().reuses, 0);
        assert_eq!(pool.pooled(8, 8, PixelFormat::Rgba8), 1);
    }

    #[test]
    fn test_seventh_buffer_is_discarded() {
        let pool = FrameBufferPool::default();
        let held: Vec<_> = (0..7)
            .map(|_| pool.acquire(16, 16, PixelFormat::Rgba8))
            .collect();
        assert_eq!(pool.stats().allocations, 7);

        for buffer in held {
            pool.release(buffer);
        }

        let stats = pool.stats();
        assert_eq!(pool.pooled(16, 16, PixelFormat::Rgba8), DEFAULT_POOL_CAPACITY);
        assert_eq!(stats.discards, 1);

        for _ in 0..DEFAULT_POOL_CAPACITY {
            let _ = pool.acquire(16, 16, PixelFormat::Rgba8);
        }
        assert_eq!(pool.stats().allocations, 7);
        let _ = pool.acquire(16, 16, PixelFormat::Rgba8);
        assert_eq!(pool.stats().allocations, 8);
    }

    #[test]
    fn test_invalid_buffer_is_not_pooled() {
        let pool = FrameBufferPool::default();
        let mut buffer = pool.acquire(4, 4, PixelFormat::Rgba8);
        let _ = buffer.take_pixels();
        pool.release(buffer);

        assert_eq!(pool.pooled(4, 4, PixelFormat::Rgba8), 0);
        assert_eq!(pool.stats().discards, 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = std::sync::Arc::new(FrameBufferPool::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let buffer = pool.acquire(32, 32, PixelFormat::Rgba8);
                        pool.release(buffer);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.allocations + stats.reuses, 400);
        assert!(stats.pooled <= DEFAULT_POOL_CAPACITY);
    }

    #[test]
    fn test_clear() {
        let pool = FrameBufferPool::new(2);
        pool.release(FrameBuffer::new(2, 2, PixelFormat::Rgba8));
        pool.clear();
        assert_eq!(pool.stats().pooled, 0);
    }
}
