//! Public Deezer API client.
//!
//! This module provides a client for the public Deezer API (api.deezer.com).
//! No authentication is required; it supplies the metadata used for naming
//! and tagging, the tracklists of albums, artists and playlists, and
//! catalogue search.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{DeezerError, Result};
use crate::http::{self, RetryPolicy};
use crate::models::{
    AlbumInfo, AlbumTrack, ArtistAlbum, ArtistInfo, CoverRef, PlaylistInfo, TrackInfo, IMAGE_CDN,
};

/// Base URL for the Deezer public API.
const API_BASE_URL: &str = "https://api.deezer.com";

/// Error code the public API uses for rate limiting.
const QUOTA_ERROR_CODE: u64 = 4;

/// Deezer answers a missing cover with a tiny placeholder body.
const PLACEHOLDER_IMAGE_LEN: usize = 13;

/// Public Deezer API client.
///
/// Provides methods to query tracks, albums, playlists, and artists
/// without requiring authentication.
///
/// # Example
///
/// ```rust,no_run
/// use deezdl::api::DeezerApi;
/// use deezdl::http::RetryPolicy;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let api = DeezerApi::new(RetryPolicy::default())?;
///     let track = api.get_track("3135556").await?;
///     println!("Track: {} by {}", track.title, track.artist.name);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DeezerApi {
    client: Client,
    base_url: String,
    image_base: String,
    retry: RetryPolicy,
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdEntry {
    id: u64,
}

impl DeezerApi {
    /// Create a new Deezer API client.
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        Self::with_base_urls(API_BASE_URL, IMAGE_CDN, retry)
    }

    /// Create a client against other API and image roots.
    pub fn with_base_urls(base_url: &str, image_base: &str, retry: RetryPolicy) -> Result<Self> {
        let client = http::client_builder()
            .build()
            .map_err(|e| DeezerError::ApiError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            image_base: image_base.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Make a GET request and check the API error envelope.
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.get_json_with_params(url, &[]).await
    }

    async fn get_json_with_params(&self, url: &str, params: &[(&str, &str)]) -> Result<Value> {
        let mut request = self.client.get(url);
        if params.is_empty() {
            debug!("GET {}", url);
        } else {
            debug!("GET {} with params: {:?}", url, params);
            request = request.query(params);
        }

        let response = http::send_with_retry(&self.retry, request).await?;
        let status = response.status();
        let text = response.text().await?;

        let data: Value = serde_json::from_str(&text).map_err(|e| {
            error!("Non-JSON answer from {} (status {})", url, status);
            DeezerError::MalformedResponse(format!("status {}: {}", status, e))
        })?;

        if let Some(error) = data.get("error") {
            let code = error.get("code").and_then(|c| c.as_u64());
            if code == Some(QUOTA_ERROR_CODE) {
                return Err(DeezerError::QuotaExceeded);
            }
            let error_msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            error!("Deezer API error: {}", error_msg);
            return Err(DeezerError::ApiError(error_msg.to_string()));
        }

        if !status.is_success() {
            return Err(DeezerError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(data)
    }

    async fn get_entity<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let data = self.get_json(&url).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch every entry of a list endpoint, following `next` links.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut next_url = Some(format!("{}/{}?limit=-1", self.base_url, path));
        let mut all = Vec::new();

        while let Some(url) = next_url {
            let page: Page<T> = serde_json::from_value(self.get_json(&url).await?)?;
            all.extend(page.data);
            next_url = page.next;
        }

        debug!("Fetched {} entries from {}", all.len(), path);
        Ok(all)
    }

    /// Get a track by ID.
    pub async fn get_track(&self, track_id: &str) -> Result<TrackInfo> {
        self.get_entity(&format!("track/{}", track_id)).await
    }

    /// Get an album by ID.
    pub async fn get_album(&self, album_id: &str) -> Result<AlbumInfo> {
        self.get_entity(&format!("album/{}", album_id)).await
    }

    /// Get an artist by ID.
    pub async fn get_artist(&self, artist_id: &str) -> Result<ArtistInfo> {
        self.get_entity(&format!("artist/{}", artist_id)).await
    }

    /// Get a playlist by ID, with its complete tracklist.
    ///
    /// The playlist object only embeds the first page of tracks; the rest
    /// is fetched from the paginated tracks endpoint.
    pub async fn get_playlist(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        let mut playlist: PlaylistInfo = self
            .get_entity(&format!("playlist/{}", playlist_id))
            .await?;

        if (playlist.track_ids.len() as u32) < playlist.nb_tracks {
            let entries: Vec<IdEntry> = self
                .get_all(&format!("playlist/{}/tracks", playlist_id))
                .await?;
            playlist.track_ids = entries.into_iter().map(|e| e.id).collect();
        }

        Ok(playlist)
    }

    /// Get every track of an album, in album order.
    pub async fn get_album_tracks(&self, album_id: &str) -> Result<Vec<AlbumTrack>> {
        self.get_all(&format!("album/{}/tracks", album_id)).await
    }

    /// Get every album of an artist.
    pub async fn get_artist_albums(&self, artist_id: &str) -> Result<Vec<ArtistAlbum>> {
        self.get_all(&format!("artist/{}/albums", artist_id)).await
    }

    /// Get an artist's most popular tracks.
    pub async fn get_artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<TrackInfo>> {
        let url = format!("{}/artist/{}/top", self.base_url, artist_id);
        let page: Page<TrackInfo> = serde_json::from_value(
            self.get_json_with_params(&url, &[("limit", &limit.to_string())])
                .await?,
        )?;
        Ok(page.data)
    }

    /// Run a catalogue search of one kind (`track`, `album`, `artist`).
    ///
    /// No match is an empty list, not an error.
    async fn search<T: DeserializeOwned>(&self, kind: &str, query: &str, limit: u32) -> Result<Vec<T>> {
        let url = format!("{}/search/{}", self.base_url, kind);
        let page: Page<T> = serde_json::from_value(
            self.get_json_with_params(&url, &[("q", query), ("limit", &limit.to_string())])
                .await?,
        )?;
        debug!("Search {} {:?}: {} results", kind, query, page.data.len());
        Ok(page.data)
    }

    /// Search for tracks.
    pub async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<TrackInfo>> {
        self.search("track", query, limit).await
    }

    /// Search for albums.
    pub async fn search_albums(&self, query: &str, limit: u32) -> Result<Vec<AlbumInfo>> {
        self.search("album", query, limit).await
    }

    /// Search for artists.
    pub async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<ArtistInfo>> {
        self.search("artist", query, limit).await
    }

    /// Fetch cover image bytes (1500x1500 PNG).
    pub async fn get_image(&self, cover: &CoverRef) -> Result<Vec<u8>> {
        let url = cover.url_at(&self.image_base, 1500);
        debug!("GET {}", url);

        let response = http::send_with_retry(&self.retry, self.client.get(&url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeezerError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.len() <= PLACEHOLDER_IMAGE_LEN {
            return Err(DeezerError::ApiError(format!("No image for {}", cover.id)));
        }
        Ok(bytes.to_vec())
    }
}
