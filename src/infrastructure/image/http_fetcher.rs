//! HTTP(S) image fetcher backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, trace, warn};

use crate::domain::entities::ImageKey;
use crate::domain::errors::FetchError;
use crate::domain::ports::{ImageFetcherPort, ProgressSink};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound for buffer preallocation from an untrusted `Content-Length`.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

const DEFAULT_USER_AGENT: &str = concat!("oxiload/", env!("CARGO_PKG_VERSION"));

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Downloads image bytes with a streaming GET, reporting progress per chunk.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Creates a fetcher with default configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(&FetcherConfig::default())
    }

    fn classify(error: &reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::transport("request timed out")
        } else if error.is_connect() {
            FetchError::transport(format!("failed to connect: {error}"))
        } else {
            FetchError::transport(error.to_string())
        }
    }
}

#[async_trait]
impl ImageFetcherPort for HttpImageFetcher {
    async fn fetch(&self, url: &str, mut progress: ProgressSink) -> Result<Bytes, FetchError> {
        let url = ImageKey::parse_url(url).map_err(|_| FetchError::bad_url(url))?;

        debug!(url = %url, "Downloading image");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Image request failed");
            Self::classify(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Image request returned error status");
            return Err(FetchError::BadResponse {
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut body = BytesMut::with_capacity(
            total
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or_default()
                .min(MAX_PREALLOCATION),
        );
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                warn!(url = %url, error = %e, "Image body read failed");
                Self::classify(&e)
            })?;
            body.extend_from_slice(&chunk);
            progress.report_bytes(body.len() as u64, total);

            if progress.is_closed() {
                trace!(url = %url, "Download abandoned by receiver");
                return Err(FetchError::transport("download cancelled"));
            }
        }

        debug!(url = %url, bytes = body.len(), "Image downloaded");
        Ok(body.freeze())
    }
}
