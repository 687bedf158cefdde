//! Album-related models.

use serde::{Deserialize, Deserializer, Serialize};

use super::common::{ArtistRef, CoverRef};

/// Album metadata from the public API (`/album/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlbumInfo {
    /// Deezer album ID.
    pub id: u64,

    /// Album title.
    pub title: String,

    /// Album artist.
    pub artist: ArtistRef,

    /// Record label.
    pub label: String,

    /// Universal Product Code.
    pub upc: String,

    /// "album", "single", "ep" or "compile".
    pub record_type: String,

    /// Release date ("YYYY-MM-DD").
    pub release_date: String,

    /// Number of tracks on the album.
    pub nb_tracks: u32,

    /// Cover image hash.
    pub md5_image: String,

    /// Genre names, flattened from `{"genres": {"data": [{"name": ..}]}}`.
    #[serde(deserialize_with = "genre_names")]
    pub genres: Vec<String>,
}

impl AlbumInfo {
    /// First genre, which is what goes into the genre tag.
    pub fn main_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }

    /// Album cover reference, if the album has one.
    pub fn cover(&self) -> Option<CoverRef> {
        (!self.md5_image.is_empty()).then(|| CoverRef::album(&self.md5_image))
    }
}

/// Entry of an album's tracklist (`/album/{id}/tracks`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlbumTrack {
    /// Deezer track ID.
    pub id: u64,

    /// Track title.
    pub title: String,

    /// Public link.
    pub link: String,

    /// Whether the track is streamable.
    pub readable: bool,
}

fn genre_names<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    struct Genre {
        #[serde(default)]
        name: String,
    }

    #[derive(Deserialize, Default)]
    struct Genres {
        #[serde(default)]
        data: Vec<Genre>,
    }

    let genres = Option::<Genres>::deserialize(d)?.unwrap_or_default();
    Ok(genres.data.into_iter().map(|g| g.name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_album() {
        let album: AlbumInfo = serde_json::from_value(json!({
            "id": 302127,
            "title": "Discovery",
            "upc": "724384960650",
            "label": "Parlophone (France)",
            "nb_tracks": 14,
            "record_type": "album",
            "release_date": "2001-03-07",
            "genres": { "data": [ { "id": 113, "name": "Dance" }, { "id": 106, "name": "Electro" } ] },
            "artist": { "id": 27, "name": "Daft Punk" }
        }))
        .unwrap();

        assert_eq!(album.title, "Discovery");
        assert_eq!(album.nb_tracks, 14);
        assert_eq!(album.genres, vec!["Dance", "Electro"]);
        assert_eq!(album.main_genre(), Some("Dance"));
        assert_eq!(album.artist.name, "Daft Punk");
        assert!(album.cover().is_none());
    }

    #[test]
    fn test_album_without_genres() {
        let album: AlbumInfo = serde_json::from_value(json!({ "id": 1, "genres": null })).unwrap();
        assert!(album.genres.is_empty());
        assert_eq!(album.main_genre(), None);
    }
}
