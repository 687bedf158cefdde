//! Artist-related models.

use serde::{Deserialize, Serialize};

/// Artist metadata from the public API (`/artist/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtistInfo {
    /// Deezer artist ID.
    pub id: u64,

    /// Artist name.
    pub name: String,

    /// Number of albums in the discography.
    pub nb_album: u32,
}

/// Entry of an artist's discography (`/artist/{id}/albums`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtistAlbum {
    /// Deezer album ID.
    pub id: u64,

    /// Album title.
    pub title: String,

    /// Public link.
    pub link: String,

    /// "album", "single", "ep" or "compile".
    pub record_type: String,
}
