//! Typed records for Deezer API responses.
//!
//! Public API entities (`TrackInfo`, `AlbumInfo`, `ArtistInfo`,
//! `PlaylistInfo`) deserialize straight from `api.deezer.com` JSON.
//! Private API entities (`PrivateTrackInfo`, `Lyrics`) are built by
//! [`crate::converters`] from gateway responses.

pub mod album;
pub mod artist;
pub mod common;
pub mod playlist;
pub mod private;
pub mod track;

pub use album::{AlbumInfo, AlbumTrack};
pub use artist::{ArtistAlbum, ArtistInfo};
pub use common::{release_year, ArtistRef, CoverKind, CoverRef, IMAGE_CDN};
pub use playlist::{PlaylistContext, PlaylistInfo};
pub use private::{FileSizes, Lyrics, PrivateTrackInfo, SyncedLyric};
pub use track::{TrackAlbum, TrackInfo};
