//! Downloader system for byte-exact content retrieval
//!
//! Design: a downloader is bound to an address and a connect timeout when
//! it is created, then asked once to read an exact number of bytes and hand
//! them to a caller-supplied continuation.

mod tcp;

pub use tcp::TcpDownloader;

use crate::error::JobError;
use async_trait::async_trait;
use std::time::Duration;

/// Continuation invoked with the downloaded bytes
///
/// Called exactly once, synchronously, while the connection is still open.
/// Its error becomes the downloader's error unchanged.
pub type OnBytes<'a> = Box<dyn FnOnce(&[u8]) -> Result<(), JobError> + Send + 'a>;

/// Creates a downloader bound to `(address, dial_timeout)`
pub type DownloaderFactory = Box<dyn Fn(&str, Duration) -> Box<dyn Downloader> + Send + Sync>;

/// Trait for byte-exact content downloaders
///
/// Implement this trait to plug a different transport (or a test double)
/// into [`ExtractService`](crate::ExtractService).
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Identifier for logging
    fn name(&self) -> &'static str;

    /// Read exactly `content_length` bytes within `read_timeout` and pass
    /// them to `on_bytes`
    ///
    /// Returns the first error of the connect, read or continuation stage.
    /// No retries are attempted.
    async fn download(
        &self,
        content_length: u64,
        read_timeout: Duration,
        on_bytes: OnBytes<'_>,
    ) -> Result<(), JobError>;
}

/// Factory producing [`TcpDownloader`]s
pub fn tcp_downloader_factory() -> DownloaderFactory {
    Box::new(|address: &str, dial_timeout: Duration| -> Box<dyn Downloader> {
        Box::new(TcpDownloader::new(address, dial_timeout))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_factory_binds_address() {
        let factory = tcp_downloader_factory();
        let downloader = factory("127.0.0.1:8080", Duration::from_secs(3));
        assert_eq!(downloader.name(), "tcp");
    }
}
