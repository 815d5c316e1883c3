//! Streaming HTTP downloader.
//!
//! The response body is regrouped into fixed-size chunks; each full chunk is appended to the
//! destination file as soon as it is complete, so memory use is bounded by the chunk size no
//! matter how large the asset is. Progress is reported after every chunk.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use percent_encoding::percent_decode_str;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::contract::{DownloadOutcome, Downloader};
use crate::error::DownloadError;

/// Default download chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// Largest chunk the downloader buffers before writing; bigger requests are clamped.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

const BAR_WIDTH: u64 = 50;

/// Cumulative progress of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub written: u64,
    pub total: Option<u64>,
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) if total > 0 => {
                let done = (BAR_WIDTH * self.written / total).min(BAR_WIDTH) as usize;
                write!(
                    f,
                    "[{}{}] {}/{} bytes downloaded",
                    "=".repeat(done),
                    " ".repeat(BAR_WIDTH as usize - done),
                    self.written,
                    total
                )
            }
            _ => write!(f, "{} bytes downloaded", self.written),
        }
    }
}

type ProgressFn = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// [`Downloader`] backed by `reqwest`.
pub struct HttpDownloader {
    client: reqwest::Client,
    chunk_size: usize,
    on_progress: Option<ProgressFn>,
}

impl HttpDownloader {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_client(reqwest::Client::new(), chunk_size)
    }

    pub fn with_client(client: reqwest::Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            on_progress: None,
        }
    }

    /// Call `f` after every chunk written.
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn write_chunk(
        &self,
        file: &mut tokio::fs::File,
        chunk: &mut Vec<u8>,
        written: &mut u64,
        total: Option<u64>,
        url: &str,
        dest: &Path,
    ) -> Result<(), DownloadError> {
        if let Err(e) = file.write_all(chunk).await {
            error!(error = ?e, url = %url, path = %dest.display(), "Failed to write chunk");
            return Err(DownloadError::new(
                url,
                format!("writing {} failed: {e}", dest.display()),
            ));
        }
        *written += chunk.len() as u64;
        chunk.clear();

        let progress = DownloadProgress {
            written: *written,
            total,
        };
        debug!(url = %url, written = *written, total = ?total, "{progress}");
        if let Some(cb) = &self.on_progress {
            cb(&progress);
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, DownloadError> {
        info!(url = %url, path = %dest.display(), "Starting download");

        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = ?e, url = %url, "HTTP request failed");
                return Err(DownloadError::new(url, e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Server returned non-success status");
            return Err(DownloadError::new(url, format!("HTTP {status}")));
        }

        let total = response.content_length();
        match total {
            Some(len) => debug!(url = %url, content_length = len, "Content length announced"),
            None => debug!(url = %url, "No content length; reporting bytes only"),
        }

        let mut file = match tokio::fs::File::create(dest).await {
            Ok(f) => f,
            Err(e) => {
                error!(error = ?e, path = %dest.display(), "Failed to create destination file");
                return Err(DownloadError::new(
                    url,
                    format!("creating {} failed: {e}", dest.display()),
                ));
            }
        };

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut written: u64 = 0;

        while let Some(item) = stream.next().await {
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    error!(error = ?e, url = %url, written, "Transport failure mid-body");
                    return Err(DownloadError::new(url, e));
                }
            };
            let mut data = &bytes[..];
            while !data.is_empty() {
                let take = (self.chunk_size - pending.len()).min(data.len());
                pending.extend_from_slice(&data[..take]);
                data = &data[take..];
                if pending.len() == self.chunk_size {
                    self.write_chunk(&mut file, &mut pending, &mut written, total, url, dest)
                        .await?;
                }
            }
        }
        if !pending.is_empty() {
            self.write_chunk(&mut file, &mut pending, &mut written, total, url, dest)
                .await?;
        }

        if let Err(e) = file.flush().await {
            error!(error = ?e, path = %dest.display(), "Failed to flush destination file");
            return Err(DownloadError::new(url, e));
        }

        if let Some(expected) = total {
            if written != expected {
                error!(url = %url, written, expected, "Body shorter than content length");
                return Err(DownloadError::new(
                    url,
                    format!("body ended after {written} of {expected} bytes"),
                ));
            }
        }

        info!(
            url = %url,
            path = %dest.display(),
            bytes = written,
            "{}",
            DownloadProgress { written, total }
        );
        Ok(DownloadOutcome {
            url: url.to_string(),
            path: dest.to_path_buf(),
            bytes_written: written,
            content_length: total,
        })
    }
}

/// Local file name for a downloaded asset: the URL's last path segment, percent-decoded.
/// Returns `None` when the URL has no usable segment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode_str(last).decode_utf8_lossy();
    let name: String = decoded
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match name.trim() {
        "" | "." | ".." => None,
        trimmed => Some(trimmed.to_string()),
    }
}
