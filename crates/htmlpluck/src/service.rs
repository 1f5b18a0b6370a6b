//! Job pipeline: decode, validate, download, extract, respond
//!
//! The service holds only the two capability factories it was built with;
//! every job is independent of every other.

use crate::downloaders::{tcp_downloader_factory, Downloader, DownloaderFactory};
use crate::error::{JobError, ValidationError};
use crate::extractors::{xpath_extractor_factory, Extractor, ExtractorFactory};
use crate::types::{JobRequest, JobResponse};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs jobs against injected downloader and extractor factories
pub struct ExtractService {
    downloaders: DownloaderFactory,
    extractors: ExtractorFactory,
}

impl Default for ExtractService {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExtractService {
    /// Create a service from custom factories
    pub fn new<D, E>(downloaders: D, extractors: E) -> Self
    where
        D: Fn(&str, Duration) -> Box<dyn Downloader> + Send + Sync + 'static,
        E: Fn(&str) -> Box<dyn Extractor> + Send + Sync + 'static,
    {
        Self {
            downloaders: Box::new(downloaders),
            extractors: Box::new(extractors),
        }
    }

    /// Create a service using TCP downloads and XPath extraction
    pub fn with_defaults() -> Self {
        Self {
            downloaders: tcp_downloader_factory(),
            extractors: xpath_extractor_factory(),
        }
    }

    /// Validate and run a decoded request, returning the matched fragments
    ///
    /// Nothing is constructed or dialed unless validation passes.
    pub async fn execute(&self, request: JobRequest) -> Result<Vec<String>, JobError> {
        request.validate()?;
        let content_length = u64::try_from(request.content_length)
            .map_err(|_| ValidationError::ZeroContentLength)?;

        let downloader = (self.downloaders)(&request.address, request.effective_dial_timeout());
        let extractor = (self.extractors)(&request.xpath_expression);
        debug!(
            downloader = downloader.name(),
            extractor = extractor.name(),
            address = %request.address,
            content_length,
            "Starting job"
        );

        let mut nodes = Vec::new();
        downloader
            .download(
                content_length,
                request.effective_read_timeout(),
                Box::new(|content: &[u8]| -> Result<(), JobError> {
                    nodes = extractor.parse(content)?;
                    Ok(())
                }),
            )
            .await?;

        Ok(nodes)
    }

    /// Decode a raw request body and run it
    pub async fn run(&self, body: &[u8]) -> JobResponse {
        let result = match JobRequest::decode(body) {
            Ok(request) => self.execute(request).await,
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!(kind = ?err.kind(), error = %err, "Job failed");
        }
        JobResponse::from(result)
    }

    /// Decode a raw request body, run it and encode the response line
    pub async fn handle(&self, body: &[u8]) -> serde_json::Result<Vec<u8>> {
        self.run(body).await.to_json_line()
    }
}
