//! Playlist-related models.

use serde::{Deserialize, Deserializer, Serialize};

use super::common::CoverRef;

/// Playlist metadata from the public API (`/playlist/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaylistInfo {
    /// Deezer playlist ID.
    pub id: u64,

    /// Playlist title.
    pub title: String,

    /// Number of tracks.
    pub nb_tracks: u32,

    /// Playlist picture hash.
    pub md5_image: String,

    /// Track IDs in playlist order, flattened from `tracks.data[].id`.
    #[serde(rename = "tracks", deserialize_with = "track_ids")]
    pub track_ids: Vec<u64>,
}

impl PlaylistInfo {
    /// Playlist picture reference, if the playlist has one.
    pub fn cover(&self) -> Option<CoverRef> {
        (!self.md5_image.is_empty()).then(|| CoverRef::playlist(&self.md5_image))
    }
}

/// A track being downloaded as part of a playlist.
#[derive(Debug, Clone)]
pub struct PlaylistContext {
    /// The playlist.
    pub playlist: PlaylistInfo,

    /// 1-based position of the track inside the playlist.
    pub position: u32,
}

fn track_ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Entry {
        id: u64,
    }

    #[derive(Deserialize, Default)]
    struct Tracks {
        #[serde(default)]
        data: Vec<Entry>,
    }

    let tracks = Option::<Tracks>::deserialize(d)?.unwrap_or_default();
    Ok(tracks.data.into_iter().map(|t| t.id).collect())
}
