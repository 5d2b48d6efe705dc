//! Attachment downloads.
//!
//! Discord serves attachments from its CDN over plain HTTPS, so a bounded
//! `reqwest` download is all that is needed.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while downloading an image
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or uses an unsupported scheme
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(StatusCode),
    /// Body exceeded the configured size limit
    #[error("image larger than {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes
        limit: u64,
    },
    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::InvalidUrl(_) | Self::TooLarge { .. } => false,
        }
    }
}

/// Downloaded image payload
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Raw body
    pub bytes: Bytes,
    /// `Content-Type` header as sent by the server
    pub content_type: Option<String>,
}

/// Interface for image downloaders
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Download the image at `url`
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// `reqwest`-backed downloader with timeout, size cap and retry
pub struct HttpImageSource {
    client: Client,
    max_bytes: u64,
}

impl HttpImageSource {
    /// Create a downloader.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }

    async fn fetch_once(&self, url: Url) -> Result<FetchedImage, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            bytes: Bytes::from(body),
            content_type,
        })
    }
}

/// Parse `raw` and accept only http(s) URLs.
///
/// # Errors
///
/// Returns `FetchError::InvalidUrl` for unparsable URLs and other schemes.
pub fn parse_image_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!("unsupported scheme {other}"))),
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let url = parse_image_url(url)?;

        let image = crate::utils::retry_operation(
            || self.fetch_once(url.clone()),
            FetchError::is_transient,
        )
        .await?;

        debug!(
            size = image.bytes.len(),
            content_type = ?image.content_type,
            "Downloaded attachment"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_url_schemes() {
        assert!(parse_image_url("https://cdn.discordapp.com/attachments/1/2/a.png").is_ok());
        assert!(parse_image_url("http://localhost:8080/a.jpg").is_ok());
        assert!(matches!(
            parse_image_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_image_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!FetchError::Status(StatusCode::NOT_FOUND).is_transient());
        assert!(!FetchError::Status(StatusCode::FORBIDDEN).is_transient());
        assert!(!FetchError::TooLarge { limit: 1 }.is_transient());
        assert!(!FetchError::InvalidUrl("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_scheme_without_network() -> Result<(), FetchError> {
        let source = HttpImageSource::new(Duration::from_secs(1), 1024)?;
        let result = source.fetch("ftp://example.com/a.png").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
        Ok(())
    }
}
