//! HTTP downloader backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::entities::ResourceId;
use crate::domain::ports::{DownloaderPort, LoadError, LoadResult};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of concurrent downloads.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// Fetches resource bytes over HTTP with bounded concurrency.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpDownloader {
    /// Creates a downloader.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        max_concurrent: usize,
    ) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::NetworkError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Creates a downloader with default timeouts and concurrency.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> LoadResult<Self> {
        Self::new(
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_READ_TIMEOUT,
            DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        )
    }
}

#[async_trait::async_trait]
impl DownloaderPort for HttpDownloader {
    async fn fetch(&self, id: &ResourceId) -> LoadResult<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LoadError::Cancelled)?;

        debug!(id = %id, "Downloading image from network");

        let response = self
            .client
            .get(id.as_str())
            .send()
            .await
            .map_err(|e| LoadError::NetworkError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoadError::NetworkError(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::NetworkError(format!("Failed to read body: {e}")))?;

        debug!(id = %id, size = bytes.len(), "Downloaded image");
        Ok(bytes)
    }
}
