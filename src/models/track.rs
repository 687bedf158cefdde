//! Track-related models.

use serde::{Deserialize, Serialize};

use super::common::{ArtistRef, CoverRef};

/// Album when nested inside a track payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackAlbum {
    /// Deezer album ID.
    pub id: u64,

    /// Album title.
    pub title: String,

    /// Release date as sent by the API ("YYYY-MM-DD").
    pub release_date: String,

    /// Cover image hash.
    pub md5_image: String,
}

/// Track metadata from the public API (`/track/{id}`).
///
/// Fetched fresh for every download; used for naming and tagging only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackInfo {
    /// Deezer track ID.
    pub id: u64,

    /// Track title.
    pub title: String,

    /// Public link, e.g. `https://www.deezer.com/track/3135556`.
    pub link: String,

    /// Position on its disc.
    pub track_position: u32,

    /// Disc number.
    pub disk_number: u32,

    /// Beats per minute (0 when unknown).
    pub bpm: f64,

    /// Whether the track is streamable in the caller's region.
    pub readable: bool,

    /// International Standard Recording Code.
    pub isrc: Option<String>,

    /// Main artist.
    pub artist: ArtistRef,

    /// Album the track belongs to.
    pub album: TrackAlbum,
}

impl TrackInfo {
    /// Album cover reference, if the album has one.
    pub fn cover(&self) -> Option<CoverRef> {
        (!self.album.md5_image.is_empty()).then(|| CoverRef::album(&self.album.md5_image))
    }
}
