// icon/fetch.rs
//
// Remote icon download. The cache only sees the IconFetcher trait so the transport
// can be swapped out (tests use an in-memory fetcher).

use crate::error::IconError;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use url::Url;

/// Fetches the raw bytes behind an icon URL.
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, IconError>;
}

/// HTTP(S) fetcher backed by a shared reqwest client.
pub struct HttpIconFetcher {
    client: reqwest::Client,
}

impl HttpIconFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("chime/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpIconFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IconFetcher for HttpIconFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, IconError> {
        debug!("Downloading: {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IconError::Fetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IconError::Fetch(e.to_string()))?;

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
