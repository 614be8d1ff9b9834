//! Scripted transport for deterministic engine tests
//!
//! Every delay is a `tokio::time::sleep`, so tests running on a paused clock
//! see exact elapsed times.

use super::Transport;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

/// Result of one scripted call after its delay
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Ok(Duration),
    Fail(Duration),
}

impl Step {
    pub(crate) fn ok_ms(ms: u64) -> Self {
        Self::Ok(Duration::from_millis(ms))
    }

    pub(crate) fn fail_ms(ms: u64) -> Self {
        Self::Fail(Duration::from_millis(ms))
    }

    async fn play(self, what: &str) -> Result<()> {
        match self {
            Self::Ok(delay) => {
                sleep(delay).await;
                Ok(())
            }
            Self::Fail(delay) => {
                sleep(delay).await;
                Err(AppError::network(format!("scripted {} failure", what)))
            }
        }
    }
}

/// Shape of every scripted download
#[derive(Debug, Clone, Copy)]
pub(crate) struct DownloadScript {
    pub chunks: usize,
    pub chunk_bytes: usize,
    pub chunk_delay: Duration,
}

#[derive(Debug)]
pub(crate) struct StubTransport {
    probes: HashMap<String, (Step, Step)>,
    download: Option<DownloadScript>,
    download_failures_from: Option<usize>,
    upload: Step,
    upload_failures_from: Option<usize>,
    texts: HashMap<String, String>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self {
            probes: HashMap::new(),
            download: None,
            download_failures_from: None,
            upload: Step::fail_ms(0),
            upload_failures_from: None,
            texts: HashMap::new(),
            downloads: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Script the primary and fallback probe of `url`. Unscripted URLs fail at once.
    pub(crate) fn probe(mut self, url: &str, primary: Step, fallback: Step) -> Self {
        self.probes.insert(url.to_string(), (primary, fallback));
        self
    }

    pub(crate) fn download_chunks(mut self, chunks: usize, chunk_bytes: usize, chunk_delay_ms: u64) -> Self {
        self.download = Some(DownloadScript {
            chunks,
            chunk_bytes,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        });
        self
    }

    /// Downloads numbered `calls` and later fail after one chunk delay
    pub(crate) fn download_fails_from(mut self, calls: usize) -> Self {
        self.download_failures_from = Some(calls);
        self
    }

    pub(crate) fn upload(mut self, step: Step) -> Self {
        self.upload = step;
        self
    }

    /// Uploads numbered `calls` and later fail
    pub(crate) fn upload_fails_from(mut self, calls: usize) -> Self {
        self.upload_failures_from = Some(calls);
        self
    }

    pub(crate) fn text(mut self, url: &str, body: &str) -> Self {
        self.texts.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Every URL passed to a transfer call, in order
    pub(crate) fn transfer_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, url: &str) {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).push(url.to_string());
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn probe(&self, url: &str) -> Result<()> {
        match self.probes.get(url) {
            Some((primary, _)) => primary.play("probe").await,
            None => Err(AppError::network(format!("no script for {}", url))),
        }
    }

    async fn probe_fallback(&self, url: &str) -> Result<()> {
        match self.probes.get(url) {
            Some((_, fallback)) => fallback.play("fallback probe").await,
            None => Err(AppError::network(format!("no script for {}", url))),
        }
    }

    async fn download(&self, url: &str, on_chunk: &mut (dyn FnMut(usize) + Send)) -> Result<u64> {
        self.record(url);
        let call = self.downloads.fetch_add(1, Ordering::SeqCst);
        let script = self
            .download
            .ok_or_else(|| AppError::network(format!("no download script for {}", url)))?;

        if self.download_failures_from.is_some_and(|from| call >= from) {
            sleep(script.chunk_delay).await;
            return Err(AppError::http_request(format!("Download from {} returned 500", url)));
        }

        let mut total = 0u64;
        for _ in 0..script.chunks {
            sleep(script.chunk_delay).await;
            on_chunk(script.chunk_bytes);
            total += script.chunk_bytes as u64;
        }
        Ok(total)
    }

    async fn upload(&self, url: &str, payload: Bytes) -> Result<u64> {
        self.record(url);
        let call = self.uploads.fetch_add(1, Ordering::SeqCst);

        if self.upload_failures_from.is_some_and(|from| call >= from) {
            return Err(AppError::http_request(format!("Upload to {} returned 500", url)));
        }

        self.upload.play("upload").await?;
        Ok(payload.len() as u64)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::http_request(format!("GET {} returned 404", url)))
    }
}
