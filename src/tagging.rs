//! Audio metadata tagging utilities.
//!
//! This module builds the tag set of a downloaded track and embeds it,
//! together with cover art, into the output file (FLAC or MP3). It also
//! writes lyrics next to the track.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::DeezerApi;
use crate::error::{DeezerError, Result};
use crate::models::{AlbumInfo, CoverRef, Lyrics, PlaylistContext, TrackInfo};

/// Title written for every track of a playlist download.
pub const PLAYLIST_TITLE_MARKER: &str = "Various Artists";

/// File name of the per-directory cover cache.
pub const COVER_FILE_NAME: &str = "cover.png";

/// Canonical tag fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    TrackNumber,
    TrackTotal,
    DiscNumber,
    Date,
    Bpm,
    Label,
    Genre,
    Isrc,
}

impl TagField {
    /// Generic lofty key. `Label` depends on the container, see [`label_key`].
    fn item_key(&self) -> ItemKey {
        match self {
            TagField::Title => ItemKey::TrackTitle,
            TagField::Artist => ItemKey::TrackArtist,
            TagField::Album => ItemKey::AlbumTitle,
            TagField::AlbumArtist => ItemKey::AlbumArtist,
            TagField::TrackNumber => ItemKey::TrackNumber,
            TagField::TrackTotal => ItemKey::TrackTotal,
            TagField::DiscNumber => ItemKey::DiscNumber,
            TagField::Date => ItemKey::RecordingDate,
            TagField::Bpm => ItemKey::Bpm,
            TagField::Label => ItemKey::Label,
            TagField::Genre => ItemKey::Genre,
            TagField::Isrc => ItemKey::Isrc,
        }
    }
}

/// ID3 has no label frame; the publisher frame (`TPUB`) carries it.
fn label_key(tag_type: TagType) -> ItemKey {
    match tag_type {
        TagType::Id3v2 => ItemKey::Publisher,
        _ => ItemKey::Label,
    }
}

/// Tag values to write, plus the cover to embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    fields: BTreeMap<TagField, String>,
    /// Cover image to embed.
    pub cover: Option<CoverRef>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. Empty values clear it.
    pub fn set<S: Into<String>>(&mut self, field: TagField, value: S) {
        let value = value.into();
        if value.is_empty() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    pub fn get(&self, field: TagField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (TagField, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Tags of a track from its public metadata and its album.
    pub fn from_metadata(track: &TrackInfo, album: &AlbumInfo) -> Self {
        let mut tags = Self::new();
        tags.set(TagField::Title, track.title.as_str());
        tags.set(TagField::Artist, track.artist.name.as_str());
        tags.set(TagField::Album, track.album.title.as_str());
        tags.set(TagField::AlbumArtist, album.artist.name.as_str());
        tags.set(TagField::Date, track.album.release_date.as_str());
        tags.set(TagField::Label, album.label.as_str());
        tags.set(TagField::Genre, album.main_genre().unwrap_or_default());

        if track.track_position > 0 {
            tags.set(TagField::TrackNumber, track.track_position.to_string());
        }
        if album.nb_tracks > 0 {
            tags.set(TagField::TrackTotal, album.nb_tracks.to_string());
        }
        if track.disk_number > 0 {
            tags.set(TagField::DiscNumber, track.disk_number.to_string());
        }
        if track.bpm > 0.0 {
            tags.set(TagField::Bpm, format!("{}", track.bpm.round() as u32));
        }
        if let Some(isrc) = &track.isrc {
            tags.set(TagField::Isrc, isrc.as_str());
        }

        tags.cover = track.cover().or_else(|| album.cover());
        tags
    }

    /// Rewrite the tags of a track that is downloaded as part of a playlist.
    pub fn apply_playlist(&mut self, ctx: &PlaylistContext) {
        self.set(TagField::Title, PLAYLIST_TITLE_MARKER);
        self.set(TagField::Album, ctx.playlist.title.as_str());
        self.set(TagField::TrackTotal, ctx.playlist.nb_tracks.to_string());
        self.set(TagField::TrackNumber, ctx.position.to_string());
        self.set(TagField::DiscNumber, "");
        self.set(TagField::Date, "");
        self.cover = ctx.playlist.cover();
    }
}

fn number(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

/// Build a fresh tag of `tag_type` holding every field.
fn build_tag(tag_type: TagType, tags: &Tags) -> Tag {
    let mut tag = Tag::new(tag_type);

    for (field, value) in tags.iter() {
        match field {
            TagField::TrackNumber => {
                if let Some(n) = number(value) {
                    tag.set_track(n);
                }
            }
            TagField::TrackTotal => {
                if let Some(n) = number(value) {
                    tag.set_track_total(n);
                }
            }
            TagField::DiscNumber => {
                if let Some(n) = number(value) {
                    tag.set_disk(n);
                }
            }
            TagField::Label => {
                tag.insert_text(label_key(tag_type), value.to_string());
            }
            _ => {
                tag.insert_text(field.item_key(), value.to_string());
            }
        }
    }

    tag
}

fn cover_picture(data: &[u8]) -> Picture {
    let mime_type = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        MimeType::Jpeg
    } else {
        MimeType::Png
    };

    Picture::new_unchecked(
        PictureType::CoverFront,
        Some(mime_type),
        None,
        data.to_vec(),
    )
}

/// Write tags (and the cover, if given) to an audio file.
///
/// The container is chosen by extension: `.flac` gets Vorbis comments and
/// a picture block, anything else ID3v2.
///
/// # Errors
///
/// Returns `TagError` if the file cannot be parsed or saved. A FLAC file
/// whose header cannot be read is deleted.
pub fn write_tags<P: AsRef<Path>>(path: P, tags: &Tags, cover: Option<&[u8]>) -> Result<()> {
    let path = path.as_ref();
    debug!("Writing tags to: {}", path.display());

    let is_flac = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("flac"));

    if is_flac {
        write_flac_tags(path, tags, cover)
    } else {
        write_mp3_tags(path, tags, cover)
    }
}

fn write_flac_tags(path: &Path, tags: &Tags, cover: Option<&[u8]>) -> Result<()> {
    if let Err(e) = lofty::read_from_path(path) {
        warn!("Unreadable FLAC header, removing {}: {}", path.display(), e);
        std::fs::remove_file(path)?;
        return Err(DeezerError::TagError(format!(
            "{}: {}",
            path.display(),
            e
        )));
    }

    TagType::VorbisComments.remove_from_path(path)?;

    let mut tag = build_tag(TagType::VorbisComments, tags);
    if let Some(data) = cover {
        tag.push_picture(cover_picture(data));
    }
    tag.save_to_path(path, WriteOptions::default())?;

    debug!("Successfully wrote FLAC tags to {}", path.display());
    Ok(())
}

fn write_mp3_tags(path: &Path, tags: &Tags, cover: Option<&[u8]>) -> Result<()> {
    lofty::read_from_path(path)?;

    for tag_type in [TagType::Id3v2, TagType::Id3v1, TagType::Ape] {
        tag_type.remove_from_path(path)?;
    }

    build_tag(TagType::Id3v2, tags).save_to_path(path, WriteOptions::default())?;

    if let Some(data) = cover {
        let mut tagged_file = lofty::read_from_path(path)?;
        if tagged_file.tag(TagType::Id3v2).is_none() {
            tagged_file.insert_tag(Tag::new(TagType::Id3v2));
        }
        if let Some(tag) = tagged_file.tag_mut(TagType::Id3v2) {
            tag.push_picture(cover_picture(data));
            tag.save_to_path(path, WriteOptions::default())?;
        }
    }

    debug!("Successfully wrote ID3 tags to {}", path.display());
    Ok(())
}

/// Fetches cover art once per destination directory.
///
/// The image is cached as `cover.png` in the directory, so the tracks of
/// an album or playlist share a single download. Jobs saving into the same
/// directory wait for each other, and the file only appears once it is
/// complete.
#[derive(Debug, Clone)]
pub struct CoverCache {
    api: DeezerApi,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl CoverCache {
    pub fn new(api: DeezerApi) -> Self {
        Self {
            api,
            locks: Arc::default(),
        }
    }

    async fn dir_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    /// Cover bytes for `cover`, from `dir/cover.png` when already present.
    pub async fn fetch(&self, cover: &CoverRef, dir: &Path) -> Result<Vec<u8>> {
        let cached = dir.join(COVER_FILE_NAME);

        let lock = self.dir_lock(dir).await;
        let _guard = lock.lock().await;

        match tokio::fs::read(&cached).await {
            Ok(bytes) if !bytes.is_empty() => {
                debug!("Using cached cover {}", cached.display());
                return Ok(bytes);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let bytes = self.api.get_image(cover).await?;
        tokio::fs::create_dir_all(dir).await?;

        let partial = dir.join(format!(".{}.{}.part", COVER_FILE_NAME, std::process::id()));
        tokio::fs::write(&partial, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, &cached).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(bytes)
    }
}

/// Same stem as the track, other extension.
fn sibling(track_path: &Path, ext: &str) -> PathBuf {
    track_path.with_extension(ext)
}

/// Write lyrics next to a track.
///
/// Synced lines go to `<track>.lrc` as `timestamp text`, one per line
/// (a line without timestamp stays empty). Otherwise the plain text goes
/// to `<track>.txt`. Returns `None` when there is nothing to write.
pub async fn write_lyrics(lyrics: &Lyrics, track_path: &Path) -> Result<Option<PathBuf>> {
    let (path, content) = if !lyrics.synced.is_empty() {
        let content: String = lyrics
            .synced
            .iter()
            .map(|l| match &l.lrc_timestamp {
                Some(ts) => format!("{} {}\n", ts, l.line),
                None => "\n".to_string(),
            })
            .collect();
        (sibling(track_path, "lrc"), content)
    } else {
        match lyrics.text.as_deref().filter(|t| !t.is_empty()) {
            Some(text) => (sibling(track_path, "txt"), text.to_string()),
            None => return Ok(None),
        }
    };

    tokio::fs::write(&path, content).await?;
    debug!("Wrote lyrics to {}", path.display());
    Ok(Some(path))
}
