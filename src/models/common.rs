//! Common types shared across all models.

use serde::{Deserialize, Serialize};

/// Image CDN root for cover art and playlist pictures.
pub const IMAGE_CDN: &str = "https://e-cdns-images.dzcdn.net/images";

/// Artist as nested in track and album payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtistRef {
    /// Deezer artist ID.
    pub id: u64,

    /// Artist name.
    pub name: String,
}

/// Year part of a "YYYY-MM-DD" release date.
pub fn release_year(date: &str) -> &str {
    date.split('-').next().unwrap_or("")
}

/// Which image family a cover identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverKind {
    /// Album cover (`md5_image` of an album, `ALB_PICTURE` on the gateway).
    Album,
    /// Playlist picture.
    Playlist,
}

/// Reference to a cover image on the image CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverRef {
    /// Image family.
    pub kind: CoverKind,

    /// Image hash.
    pub id: String,
}

impl CoverRef {
    /// Album cover reference.
    pub fn album<S: Into<String>>(id: S) -> Self {
        Self {
            kind: CoverKind::Album,
            id: id.into(),
        }
    }

    /// Playlist picture reference.
    pub fn playlist<S: Into<String>>(id: S) -> Self {
        Self {
            kind: CoverKind::Playlist,
            id: id.into(),
        }
    }

    /// PNG URL for a square image of `size` pixels.
    pub fn url(&self, size: u32) -> String {
        self.url_at(IMAGE_CDN, size)
    }

    /// Same as [`CoverRef::url`] against another image root.
    pub fn url_at(&self, base: &str, size: u32) -> String {
        let family = match self.kind {
            CoverKind::Album => "cover",
            CoverKind::Playlist => "playlist",
        };
        format!("{}/{}/{}/{}x{}.png", base.trim_end_matches('/'), family, self.id, size, size)
    }
}
