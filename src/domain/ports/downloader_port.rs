//! Port definition for fetching raw image bytes.

use async_trait::async_trait;
use bytes::Bytes;

use super::image_cache_port::LoadResult;
use crate::domain::entities::ResourceId;

/// Port for network fetches.
#[async_trait]
pub trait DownloaderPort: Send + Sync {
    /// Fetches the raw bytes behind `id`.
    ///
    /// Failures are never retried here; retry policy belongs to the caller.
    async fn fetch(&self, id: &ResourceId) -> LoadResult<Bytes>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::ports::LoadError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::RwLock;

    /// Mock downloader serving canned responses.
    pub struct MockDownloader {
        responses: RwLock<HashMap<ResourceId, Bytes>>,
        calls: RwLock<HashMap<ResourceId, usize>>,
        total_calls: AtomicUsize,
        delay: Duration,
    }

    impl MockDownloader {
        /// Creates a mock with no responses; every fetch fails.
        pub fn new() -> Self {
            Self {
                responses: RwLock::new(HashMap::new()),
                calls: RwLock::new(HashMap::new()),
                total_calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        /// Delays every fetch, simulating a slow network.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Serves `bytes` for `id`.
        pub async fn respond(&self, id: &ResourceId, bytes: impl Into<Bytes>) {
            self.responses.write().await.insert(id.clone(), bytes.into());
        }

        /// Number of fetches issued for `id`.
        pub async fn calls_for(&self, id: &ResourceId) -> usize {
            self.calls.read().await.get(id).copied().unwrap_or(0)
        }

        /// Number of fetches issued overall.
        pub fn total_calls(&self) -> usize {
            self.total_calls.load(Ordering::SeqCst)
        }
    }

    impl Default for MockDownloader {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DownloaderPort for MockDownloader {
        async fn fetch(&self, id: &ResourceId) -> LoadResult<Bytes> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            *self.calls.write().await.entry(id.clone()).or_insert(0) += 1;

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.responses
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| LoadError::NetworkError(format!("HTTP 404: {id}")))
        }
    }
}
