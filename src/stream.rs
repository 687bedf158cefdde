//! Resumable download of an encrypted media stream.
//!
//! Bytes are decrypted as they arrive and appended to
//! `<final>.<quality code>.tmp`. An interrupted download leaves the temp
//! file in place; the next attempt at the same quality
//! resumes from its size rounded down to a chunk boundary, so the chunk
//! stripe stays aligned. The temp file is renamed only once the stream
//! ended cleanly.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crypto::{BlowfishKey, StripeDecryptor, CHUNK_SIZE};
use crate::error::{DeezerError, Result};
use crate::http::{self, RetryPolicy};
use crate::quality::QualityTier;

/// Result of a download that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The decrypted file is at this path.
    Completed(PathBuf),
    /// The CDN announced an empty body; nothing was written.
    Unavailable,
}

/// Temp path for a destination and tier: `<final>.<code>.tmp`.
///
/// The tier is part of the name because several tiers share an extension
/// and a partial file must only be resumed with the same stream.
pub fn temp_path(final_path: &Path, tier: QualityTier) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(format!(".{}.tmp", tier.code()));
    PathBuf::from(name)
}

/// Start offset and total length from a `Content-Range` header value.
fn parse_content_range(value: &str) -> (Option<u64>, Option<u64>) {
    let Some(spec) = value.trim().strip_prefix("bytes ") else {
        return (None, None);
    };
    let (range, total) = spec.split_once('/').unwrap_or((spec, "*"));
    let start = range.split_once('-').and_then(|(s, _)| s.parse().ok());
    (start, total.parse().ok())
}

/// Downloads and decrypts media streams.
#[derive(Debug, Clone)]
pub struct StreamDownloader {
    client: Client,
    retry: RetryPolicy,
}

/// What the server answered to a resume request.
enum Resume {
    Stream(Response),
    AlreadyComplete,
}

impl StreamDownloader {
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let client = http::client_builder()
            .build()
            .map_err(|e| DeezerError::ApiError(format!("Failed to create client: {}", e)))?;
        Ok(Self { client, retry })
    }

    /// Download `url` (the stream of `tier`), decrypting with `key`, into
    /// `final_path`.
    ///
    /// # Errors
    ///
    /// - `Download` when the stream breaks off; the temp file is kept.
    /// - `RangeNotHonored` when a resume request is not answered with the
    ///   requested byte range.
    /// - `Cancelled` when `cancel` fires; the temp file is kept.
    pub async fn download(
        &self,
        url: &str,
        key: &BlowfishKey,
        tier: QualityTier,
        final_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        if cancel.is_cancelled() {
            return Err(DeezerError::Cancelled);
        }

        let temp = temp_path(final_path, tier);
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::metadata(&temp).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let offset = existing - existing % CHUNK_SIZE as u64;

        let response = if offset > 0 {
            info!("Resuming {} at byte {}", temp.display(), offset);
            match self.request_range(url, offset).await? {
                Resume::Stream(response) => response,
                Resume::AlreadyComplete => {
                    fs::OpenOptions::new()
                        .write(true)
                        .open(&temp)
                        .await?
                        .set_len(offset)
                        .await?;
                    fs::rename(&temp, final_path).await?;
                    remove_stale_temps(final_path, tier).await;
                    return Ok(DownloadOutcome::Completed(final_path.to_path_buf()));
                }
            }
        } else {
            let response = http::send_with_retry(&self.retry, self.client.get(url)).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DeezerError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            if response.content_length() == Some(0) {
                warn!("CDN has no content for {}", final_path.display());
                return Ok(DownloadOutcome::Unavailable);
            }
            response
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&temp)
            .await?;
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut decryptor = StripeDecryptor::new(key, offset / CHUNK_SIZE as u64)?;
        let mut stream = response.bytes_stream();
        let mut written = offset;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next() => Some(next),
            };

            match next {
                None => {
                    file.write_all(&decryptor.take_pending()).await?;
                    file.flush().await?;
                    warn!("Download of {} cancelled", final_path.display());
                    return Err(DeezerError::Cancelled);
                }
                Some(Some(Ok(bytes))) => {
                    let out = decryptor.update(&bytes);
                    file.write_all(&out).await?;
                    written += out.len() as u64;
                }
                Some(Some(Err(e))) => {
                    let pending = decryptor.take_pending();
                    file.write_all(&pending).await?;
                    file.flush().await?;
                    written += pending.len() as u64;
                    warn!(
                        "Stream for {} broke off after {} bytes: {}",
                        final_path.display(),
                        written,
                        e
                    );
                    return Err(DeezerError::Download(e.to_string()));
                }
                Some(None) => break,
            }
        }

        let tail = decryptor.take_pending();
        file.write_all(&tail).await?;
        file.flush().await?;
        written += tail.len() as u64;
        drop(file);

        fs::rename(&temp, final_path).await?;
        remove_stale_temps(final_path, tier).await;
        debug!("Wrote {} bytes to {}", written, final_path.display());

        Ok(DownloadOutcome::Completed(final_path.to_path_buf()))
    }

    /// Request `bytes=offset-` and insist on getting exactly that range.
    async fn request_range(&self, url: &str, offset: u64) -> Result<Resume> {
        let request = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-", offset));
        let response = http::send_with_retry(&self.retry, request).await?;

        let status = response.status();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let (start, total) = parse_content_range(&content_range);

        match status {
            StatusCode::PARTIAL_CONTENT if start == Some(offset) => Ok(Resume::Stream(response)),
            StatusCode::RANGE_NOT_SATISFIABLE if total == Some(offset) => {
                debug!("Temp file already holds all {} bytes", offset);
                Ok(Resume::AlreadyComplete)
            }
            _ => Err(DeezerError::RangeNotHonored {
                requested: offset,
                received: format!("{} {}", status, content_range).trim().to_string(),
            }),
        }
    }
}

/// Drop partial files other tiers left for the same destination.
async fn remove_stale_temps(final_path: &Path, done: QualityTier) {
    for tier in QualityTier::ALL.into_iter().filter(|t| *t != done) {
        let stale = temp_path(final_path, tier);
        match fs::remove_file(&stale).await {
            Ok(()) => debug!("Removed stale {}", stale.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", stale.display(), e),
        }
    }
}
