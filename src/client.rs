//! HTTP transport used by the probe, the samplers and the network info lookup
//!
//! Everything that touches the network goes through the [`Transport`] trait so
//! the measurement code can be driven by scripted transports in tests. None of
//! the transport calls carry their own deadline; callers bound them with
//! `tokio::time::timeout_at` so one clock governs each measurement.


#[cfg(test)]
pub(crate) mod stub;

use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{header, Client};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Query parameter appended to every measurement request
const CACHE_BUST_PARAM: &str = "cachebust";

/// Network operations needed by the measurement engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Minimal round trip without a body. Any HTTP status counts as a reply;
    /// only a transport failure is an error.
    async fn probe(&self, url: &str) -> Result<()>;

    /// Alternate round trip used when `probe` fails. Requests a tiny resource
    /// from the endpoint's origin.
    async fn probe_fallback(&self, url: &str) -> Result<()>;

    /// Stream a download, calling `on_chunk` with the size of every chunk as
    /// it arrives. Returns the total number of bytes received.
    async fn download(&self, url: &str, on_chunk: &mut (dyn FnMut(usize) + Send)) -> Result<u64>;

    /// POST an opaque payload. Completes when the server has answered with a
    /// success status; the response body is not read. Returns bytes sent.
    async fn upload(&self, url: &str, payload: Bytes) -> Result<u64>;

    /// GET a small text document
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// [`Transport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default client settings
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn probe(&self, url: &str) -> Result<()> {
        self.client
            .head(cache_busted(url))
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await?;

        Ok(())
    }

    async fn probe_fallback(&self, url: &str) -> Result<()> {
        let target = favicon_url(url)?;

        self.client
            .get(cache_busted(&target))
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        Ok(())
    }

    async fn download(&self, url: &str, on_chunk: &mut (dyn FnMut(usize) + Send)) -> Result<u64> {
        let response = self
            .client
            .get(cache_busted(url))
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::http_request(format!("Download from {} returned {}", url, status)));
        }

        let mut total: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            on_chunk(chunk.len());
        }

        Ok(total)
    }

    async fn upload(&self, url: &str, payload: Bytes) -> Result<u64> {
        let size = payload.len() as u64;

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CACHE_CONTROL, "no-store")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::http_request(format!("Upload to {} returned {}", url, status)));
        }

        Ok(size)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::http_request(format!("GET {} returned {}", url, status)));
        }

        Ok(response.text().await?)
    }
}

/// Append a unique cache-busting query parameter to `url`
pub fn cache_busted(url: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();

    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(CACHE_BUST_PARAM, &token);
            parsed.into()
        }
        Err(_) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", url, separator, CACHE_BUST_PARAM, token)
        }
    }
}

/// The `/favicon.ico` of `url`'s origin
pub fn favicon_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    if parsed.host_str().is_none() {
        return Err(AppError::validation(format!("URL has no host: {}", url)));
    }

    Ok(parsed.join("/favicon.ico")?.into())
}
