//! Unified download interface.
//!
//! [`Deezdl`] runs the per-track pipeline (metadata, private info,
//! quality negotiation, download, tags, lyrics) and expands album, artist
//! and playlist links into batches of tracks.

use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{DeezerApi, GatewayApi, Session};
use crate::collab::{CacheEntry, TrackCache};
use crate::config::Config;
use crate::crypto;
use crate::error::{DeezerError, Result};
use crate::link::{Link, MediaType};
use crate::models::{CoverRef, PlaylistContext, PrivateTrackInfo, TrackInfo};
use crate::naming;
use crate::quality::{self, QualityTier};
use crate::stream::{DownloadOutcome, StreamDownloader};
use crate::tagging::{self, CoverCache, Tags};

/// Why a track was skipped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No tier at or below the requested one has a file.
    QualityUnavailable,
    /// The CDN answered with an empty body.
    EmptyStream,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::QualityUnavailable => f.write_str("not available in the requested quality or lower"),
            SkipReason::EmptyStream => f.write_str("no content on the CDN"),
        }
    }
}

/// A freshly downloaded track.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedTrack {
    /// Path to the tagged file.
    pub path: PathBuf,
    /// Quality that was actually used.
    pub quality: QualityTier,
    /// Quality that was asked for.
    pub requested: QualityTier,
    /// Track title.
    pub title: String,
    /// Artist name.
    pub artist: String,
    /// Lyrics file written next to the track.
    pub lyrics: Option<PathBuf>,
}

/// A track that was already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTrack {
    pub path: PathBuf,
    pub artist: String,
    pub title: String,
}

/// Result of one track job that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Downloaded(DownloadedTrack),
    /// The destination file was already there; nothing was fetched.
    AlreadyExists(StoredTrack),
    /// Served from a [`TrackCache`].
    Cached(StoredTrack),
    Skipped(SkipReason),
}

impl TrackOutcome {
    /// Path of the file on disk, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            TrackOutcome::Downloaded(track) => Some(&track.path),
            TrackOutcome::AlreadyExists(stored) | TrackOutcome::Cached(stored) => Some(&stored.path),
            TrackOutcome::Skipped(_) => None,
        }
    }
}

/// Outcome of one item of a batch.
#[derive(Debug)]
pub struct ItemReport {
    pub track_id: String,
    pub result: Result<TrackOutcome>,
}

/// Per-item results of a link download, in batch order.
#[derive(Debug)]
pub struct BatchReport {
    pub link: Link,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    /// Total number of items attempted.
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items with a file on disk.
    pub fn completed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(&i.result, Ok(o) if o.path().is_some()))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.result, Ok(TrackOutcome::Skipped(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_err()).count()
    }

    /// Check if every item ended with a file on disk.
    pub fn all_successful(&self) -> bool {
        self.completed() == self.total()
    }
}

/// One track to download within a batch.
struct Job {
    track_id: String,
    playlist: Option<PlaylistContext>,
}

impl Job {
    fn track(track_id: u64) -> Self {
        Self {
            track_id: track_id.to_string(),
            playlist: None,
        }
    }
}

/// Main download interface.
///
/// # Example
///
/// ```rust,no_run
/// use deezdl::{Config, Deezdl, Link};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dz = Deezdl::new(Config::with_arl("your_arl_token")).await?;
///
///     let link = Link::parse("https://www.deezer.com/album/302127")?;
///     let report = dz.download_link(&link).await?;
///     println!("{} of {} tracks on disk", report.completed(), report.total());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Deezdl {
    config: Config,
    quality: QualityTier,
    public_api: DeezerApi,
    gateway_api: GatewayApi,
    downloader: StreamDownloader,
    covers: CoverCache,
    media_origin: Option<String>,
    cancel: CancellationToken,
}

impl Deezdl {
    /// Validate `config` and log in.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unusable settings and `BadCredentials`
    /// if the ARL token is invalid.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let session = Session::login(&config.arl, config.retry).await?;
        let public_api = DeezerApi::new(config.retry)?;
        Self::with_clients(config, public_api, GatewayApi::new(session))
    }

    /// Build from already constructed API clients.
    pub fn with_clients(config: Config, public_api: DeezerApi, gateway_api: GatewayApi) -> Result<Self> {
        config.validate()?;
        let quality = config.quality_tier()?;
        let downloader = StreamDownloader::new(config.retry)?;
        let covers = CoverCache::new(public_api.clone());

        Ok(Self {
            config,
            quality,
            public_api,
            gateway_api,
            downloader,
            covers,
            media_origin: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Fetch media from a local server instead of the CDN. Only the origin
    /// is replaced; the path is kept.
    #[cfg(test)]
    pub(crate) fn with_media_origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.media_origin = Some(origin.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn public_api(&self) -> &DeezerApi {
        &self.public_api
    }

    pub fn gateway_api(&self) -> &GatewayApi {
        &self.gateway_api
    }

    /// Token that aborts running downloads when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download everything a link points to.
    ///
    /// Failures of single tracks are recorded in the report and the batch
    /// goes on. Fatal errors (bad credentials, invalid configuration) and
    /// cancellation abort the batch.
    pub async fn download_link(&self, link: &Link) -> Result<BatchReport> {
        let jobs = self.expand(link).await?;
        info!("{} expands to {} tracks", link, jobs.len());

        let mut results = stream::iter(jobs)
            .map(|job| async move {
                let result = self
                    .download_track(&job.track_id, job.playlist.as_ref())
                    .await;
                ItemReport {
                    track_id: job.track_id,
                    result,
                }
            })
            .buffered(self.config.concurrency);

        let mut items = Vec::new();
        while let Some(item) = results.next().await {
            let item = match item.result {
                Err(e) if e.is_fatal() || matches!(e, DeezerError::Cancelled) => {
                    error!("Aborting {} at track {}: {}", link, item.track_id, e);
                    return Err(e);
                }
                result => ItemReport {
                    track_id: item.track_id,
                    result,
                },
            };
            match &item.result {
                Err(e) => warn!("Track {} failed: {}", item.track_id, e),
                Ok(TrackOutcome::Skipped(reason)) => {
                    warn!("Track {} skipped: {}", item.track_id, reason)
                }
                Ok(_) => {}
            }
            items.push(item);
        }

        Ok(BatchReport {
            link: link.clone(),
            items,
        })
    }

    async fn expand(&self, link: &Link) -> Result<Vec<Job>> {
        match link.media_type {
            MediaType::Track => Ok(vec![Job {
                track_id: link.id.clone(),
                playlist: None,
            }]),
            MediaType::Album => {
                let tracks = self.public_api.get_album_tracks(&link.id).await?;
                Ok(tracks.into_iter().map(|t| Job::track(t.id)).collect())
            }
            MediaType::Artist => {
                let albums = self.public_api.get_artist_albums(&link.id).await?;
                let mut jobs = Vec::new();
                for album in albums {
                    match self.public_api.get_album_tracks(&album.id.to_string()).await {
                        Ok(tracks) => jobs.extend(tracks.into_iter().map(|t| Job::track(t.id))),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!("Skipping album {} ({}): {}", album.title, album.id, e),
                    }
                }
                Ok(jobs)
            }
            MediaType::Playlist => {
                let mut playlist = self.public_api.get_playlist(&link.id).await?;
                let track_ids = std::mem::take(&mut playlist.track_ids);
                Ok(track_ids
                    .into_iter()
                    .zip(1u32..)
                    .map(|(id, position)| Job {
                        track_id: id.to_string(),
                        playlist: Some(PlaylistContext {
                            playlist: playlist.clone(),
                            position,
                        }),
                    })
                    .collect())
            }
        }
    }

    /// Download, tag and name one track.
    ///
    /// With a playlist context the playlist naming template is used and the
    /// tags are rewritten for the playlist.
    pub async fn download_track(
        &self,
        track_id: &str,
        playlist: Option<&PlaylistContext>,
    ) -> Result<TrackOutcome> {
        let track = self.public_api.get_track(track_id).await?;
        let album = self
            .public_api
            .get_album(&track.album.id.to_string())
            .await?;

        let private = self
            .gateway_api
            .resolve_track(track_id, self.config.max_fallback_depth)
            .await?;

        let Some(negotiated) = quality::negotiate(&private, self.quality) else {
            warn!(
                "{} is not available in {} or lower, skipping",
                track_label(&track, &private),
                self.quality
            );
            return Ok(TrackOutcome::Skipped(SkipReason::QualityUnavailable));
        };

        let template = match playlist {
            Some(_) => &self.config.playlist_naming_template,
            None => &self.config.naming_template,
        };
        let relative = naming::render_path(template, &track, &album, playlist)?;
        let mut final_path = self.config.output_dir.join(relative).into_os_string();
        final_path.push(negotiated.tier.extension());
        let final_path = PathBuf::from(final_path);

        if tokio::fs::try_exists(&final_path).await? {
            info!("{} already exists", final_path.display());
            return Ok(TrackOutcome::AlreadyExists(StoredTrack {
                path: final_path,
                artist: track.artist.name,
                title: track.title,
            }));
        }

        let mut url = crypto::download_url(&private, negotiated.tier)?;
        if let Some(origin) = &self.media_origin {
            url = rebase(&url, origin);
        }
        let key = crypto::calc_blowfish_key(&private.sng_id);

        let outcome = self
            .stream_with_resume(&url, &key, negotiated.tier, &final_path)
            .await?;
        let path = match outcome {
            DownloadOutcome::Completed(path) => path,
            DownloadOutcome::Unavailable => {
                warn!("{} has no content, skipping", track_label(&track, &private));
                return Ok(TrackOutcome::Skipped(SkipReason::EmptyStream));
            }
        };

        let mut tags = Tags::from_metadata(&track, &album);
        if tags.cover.is_none() {
            tags.cover = private.album_picture.clone().map(CoverRef::album);
        }
        if let Some(ctx) = playlist {
            tags.apply_playlist(ctx);
        }

        let cover = match (&tags.cover, self.config.embed_cover_art) {
            (Some(cover_ref), true) => {
                let dir = path.parent().unwrap_or(Path::new("."));
                match self.covers.fetch(cover_ref, dir).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!("No cover for {}: {}", path.display(), e);
                        None
                    }
                }
            }
            _ => None,
        };

        let tag_path = path.clone();
        tokio::task::spawn_blocking(move || tagging::write_tags(&tag_path, &tags, cover.as_deref()))
            .await
            .map_err(|e| DeezerError::TagError(format!("tag task failed: {}", e)))??;

        let lyrics = if self.config.fetch_lyrics {
            self.fetch_lyrics(track_id, &path).await
        } else {
            None
        };

        if negotiated.is_downgrade() {
            info!(
                "Downloaded {} in {} instead of {}",
                path.display(),
                negotiated.tier,
                negotiated.requested
            );
        } else {
            info!("Downloaded {}", path.display());
        }

        Ok(TrackOutcome::Downloaded(DownloadedTrack {
            path,
            quality: negotiated.tier,
            requested: negotiated.requested,
            title: track.title,
            artist: track.artist.name,
            lyrics,
        }))
    }

    /// [`Deezdl::download_track`] for a track link, consulting `cache`
    /// first and recording the result in it.
    pub async fn download_track_cached<C: TrackCache + Sync>(
        &self,
        link: &Link,
        cache: &C,
    ) -> Result<TrackOutcome> {
        if link.media_type != MediaType::Track {
            return Err(DeezerError::InvalidLink(format!(
                "{} is not a track link",
                link
            )));
        }
        let key = link.url();

        if let Some(entry) = cache.lookup(&key).await? {
            if tokio::fs::try_exists(&entry.path).await? {
                debug!("{} served from cache", key);
                cache.touch(&key).await?;
                return Ok(TrackOutcome::Cached(StoredTrack {
                    path: entry.path,
                    artist: entry.performer,
                    title: entry.title,
                }));
            }
            debug!("Cached file {} is gone", entry.path.display());
        }

        let outcome = self.download_track(&link.id, None).await?;
        match &outcome {
            TrackOutcome::Downloaded(track) => {
                cache
                    .record(
                        &key,
                        CacheEntry::new(track.path.clone(), track.artist.clone(), track.title.clone()),
                    )
                    .await?;
            }
            TrackOutcome::AlreadyExists(stored) => {
                cache
                    .record(
                        &key,
                        CacheEntry::new(stored.path.clone(), stored.artist.clone(), stored.title.clone()),
                    )
                    .await?;
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Stream a track, resuming from the temp file on retryable failures.
    async fn stream_with_resume(
        &self,
        url: &str,
        key: &crypto::BlowfishKey,
        tier: QualityTier,
        final_path: &Path,
    ) -> Result<DownloadOutcome> {
        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            match self
                .downloader
                .download(url, key, tier, final_path, &self.cancel)
                .await
            {
                Err(e) if e.is_retryable() && attempt < retry.retries => {
                    attempt += 1;
                    let delay = retry.delay(attempt);
                    warn!(
                        "Download of {} interrupted ({}), resuming in {:?}",
                        final_path.display(),
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(DeezerError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn fetch_lyrics(&self, track_id: &str, track_path: &Path) -> Option<PathBuf> {
        let lyrics = match self.gateway_api.get_lyrics(track_id).await {
            Ok(lyrics) if !lyrics.is_empty() => lyrics,
            Ok(_) => {
                info!("No lyrics for track {}", track_id);
                return None;
            }
            Err(e) => {
                info!("No lyrics for track {}: {}", track_id, e);
                return None;
            }
        };

        match tagging::write_lyrics(&lyrics, track_path).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Could not write lyrics for {}: {}", track_path.display(), e);
                None
            }
        }
    }
}

/// `Artist - Title` for log lines, filling blanks in the public record from
/// the gateway's.
fn track_label(track: &TrackInfo, private: &PrivateTrackInfo) -> String {
    let pick = |public: &str, gateway: &str| -> String {
        if public.trim().is_empty() {
            gateway.to_string()
        } else {
            public.to_string()
        }
    };
    format!(
        "{} - {}",
        pick(&track.artist.name, &private.artist),
        pick(&track.title, &private.title)
    )
}

/// Replace the origin of a CDN URL, keeping its path.
fn rebase(url: &str, origin: &str) -> String {
    let path = url
        .find("://")
        .and_then(|scheme| url[scheme + 3..].find('/').map(|i| &url[scheme + 3 + i..]))
        .unwrap_or("");
    format!("{}{}", origin.trim_end_matches('/'), path)
}
