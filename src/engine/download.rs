//! File download mode with streaming support.
//!
//! A [`Downloader`] sends a request exactly like the text modes (same proxy,
//! timeout, header, and payload semantics) but streams the response body to
//! a file instead of reading it into memory, reporting cumulative progress
//! through an optional observer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use crate::error::FetchError;
use crate::request::Request;
use crate::response::Timing;
use crate::transport::Transport;

use super::{Launch, send};

/// Observer invoked with the cumulative byte count as chunks arrive.
pub type ProgressObserver = Arc<dyn Fn(u64) + Send + Sync>;

/// Metadata for a completed download.
#[derive(Debug, Clone)]
pub struct DownloadReceipt {
    /// Where the file was written.
    pub path: PathBuf,
    /// Bytes written to disk.
    pub bytes_written: u64,
    /// The server's Content-Length, when it sent one.
    pub content_length: Option<u64>,
    /// The HTTP status of the response.
    pub status: StatusCode,
    /// Wall-clock timing for the whole download.
    pub timing: Timing,
}

/// File download mode over a shared [`Transport`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use courier::{Downloader, Request, Transport};
///
/// # async fn example() -> Result<(), courier::FetchError> {
/// let downloader = Downloader::new(Transport::new()?);
/// let receipt = downloader
///     .download(
///         Request::get("https://example.com/archive.tar.gz"),
///         Path::new("./archive.tar.gz"),
///     )
///     .await?;
/// println!("{} bytes -> {}", receipt.bytes_written, receipt.path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Downloader {
    transport: Transport,
    progress: Option<ProgressObserver>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("transport", &self.transport)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Downloader {
    /// Creates a downloader over the given transport.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            progress: None,
        }
    }

    /// Attaches a progress observer, called with the cumulative byte count
    /// after each chunk is written.
    #[must_use]
    pub fn with_progress(mut self, observer: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(observer));
        self
    }

    /// Downloads the response body of `request` to `dest`.
    ///
    /// The body is streamed through a buffered writer, never held in memory
    /// whole. On a mid-stream failure the partial file is removed.
    ///
    /// # Errors
    ///
    /// - [`FetchError::HttpStatus`] when the server answers with a non-2xx
    ///   status (unlike the text modes, there is no partial file worth
    ///   keeping, so an error status IS an error here)
    /// - [`FetchError::Io`] when the file cannot be created or written
    /// - [`FetchError::Integrity`] when the server sent a Content-Length and
    ///   the byte count on disk disagrees
    /// - the usual [`FetchError::Network`] / [`FetchError::Timeout`] /
    ///   [`FetchError::InvalidUrl`] request failures
    #[instrument(skip(self, request, dest), fields(url = request.url(), dest = %dest.as_ref().display()))]
    pub async fn download(
        &self,
        request: Request,
        dest: impl AsRef<Path>,
    ) -> Result<DownloadReceipt, FetchError> {
        let dest = dest.as_ref();
        let launch = Launch::fresh(request);

        let response = send(&self.transport, &launch.request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(
                launch.request.url(),
                status.as_u16(),
            ));
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let file = File::create(dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;

        let stream_result = self
            .stream_to_file(file, response, launch.request.url(), dest)
            .await;

        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %dest.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(dest).await;
                return Err(error);
            }
        };

        if let Some(expected) = content_length {
            if expected != bytes_written {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(FetchError::integrity(dest, expected, bytes_written));
            }
        }

        let timing = Timing {
            started_at: launch.started_at,
            finished_at: SystemTime::now(),
            elapsed: launch.origin.elapsed(),
        };

        info!(
            path = %dest.display(),
            bytes = bytes_written,
            elapsed_ms = timing.elapsed.as_millis(),
            "download complete"
        );

        Ok(DownloadReceipt {
            path: dest.to_path_buf(),
            bytes_written,
            content_length,
            status,
            timing,
        })
    }

    /// Streams the response body to the file, returning bytes written.
    async fn stream_to_file(
        &self,
        mut file: File,
        response: reqwest::Response,
        url: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let mut writer = BufWriter::new(&mut file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(dest, e))?;

            bytes_written += chunk.len() as u64;
            if let Some(observer) = &self.progress {
                observer(bytes_written);
            }
        }

        // Ensure all data reaches the disk before the byte count is trusted.
        writer.flush().await.map_err(|e| FetchError::io(dest, e))?;

        Ok(bytes_written)
    }
}
