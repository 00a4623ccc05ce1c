//! HTTP Fetcher
//!
//! Thin wrapper over reqwest shared by the catalog and the synchronizer.
//! Applies the configured timeout, maps failures onto [`MirrorError`] and
//! retries transient errors with exponential backoff.

use std::time::Duration;

use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};

/// Backoff between attempts, in milliseconds. The last value repeats.
const BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

/// Result of a conditional artifact request
pub enum Fetched {
    /// Server answered 304 to `If-Modified-Since`
    NotModified,
    /// Headers received, body not read yet
    Ready(ArtifactResponse),
}

/// Successful response whose body has not been consumed
pub struct ArtifactResponse {
    url: String,
    response: Response,
}

impl ArtifactResponse {
    /// `Last-Modified` header, if the server sent a readable one
    pub fn last_modified(&self) -> Option<String> {
        self.header(LAST_MODIFIED)
    }

    fn header(&self, name: reqwest::header::HeaderName) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Read the full body
    pub async fn bytes(self) -> Result<Vec<u8>> {
        let url = self.url;
        let bytes = self
            .response
            .bytes()
            .await
            .map_err(|e| MirrorError::from_reqwest(&url, e))?;
        Ok(bytes.to_vec())
    }
}

/// HTTP client with mirror-wide timeout and retry policy
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        Self::with_settings(config.request_timeout(), config.max_retries)
    }

    pub fn with_settings(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ckan-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Download a whole document in one GET, no retries
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        match self.send(url, None).await? {
            Fetched::Ready(response) => response.bytes().await,
            // Only possible for conditional requests
            Fetched::NotModified => Err(MirrorError::Http {
                url: url.to_string(),
                status: StatusCode::NOT_MODIFIED.as_u16(),
            }),
        }
    }

    /// Conditional GET with retry for transient failures
    ///
    /// # Arguments
    /// * `url` - Artifact URL
    /// * `if_modified_since` - Cached freshness token, sent as `If-Modified-Since`
    pub async fn fetch(&self, url: &str, if_modified_since: Option<&str>) -> Result<Fetched> {
        let mut attempt = 0;
        loop {
            match self.send(url, if_modified_since).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = BACKOFF_MS
                        .get(attempt as usize)
                        .copied()
                        .unwrap_or(BACKOFF_MS[BACKOFF_MS.len() - 1]);
                    warn!(
                        url = url,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay,
                        error = %e,
                        "Retrying download"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, url: &str, if_modified_since: Option<&str>) -> Result<Fetched> {
        debug!(url = url, if_modified_since = ?if_modified_since, "GET");

        let mut request = self.client.get(url);
        if let Some(token) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MirrorError::from_reqwest(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Fetched::NotModified);
        }
        if !status.is_success() {
            return Err(MirrorError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Fetched::Ready(ArtifactResponse {
            url: url.to_string(),
            response,
        }))
    }
}
