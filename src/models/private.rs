//! Records built from the private gateway API.

use crate::quality::QualityTier;

/// Reported file size per quality tier, in bytes (0 = not available).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSizes {
    pub flac: u64,
    pub mp3_320: u64,
    pub mp3_256: u64,
    pub mp3_128: u64,
}

impl FileSizes {
    /// Size reported for a tier.
    pub fn get(&self, tier: QualityTier) -> u64 {
        match tier {
            QualityTier::Flac => self.flac,
            QualityTier::Mp3_320 => self.mp3_320,
            QualityTier::Mp3_256 => self.mp3_256,
            QualityTier::Mp3_128 => self.mp3_128,
        }
    }
}

/// Decryption-relevant track data from `deezer.pageTrack`.
///
/// Obtained once per download attempt and never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateTrackInfo {
    /// `SNG_ID`; after fallback resolution this is the id that keys the
    /// Blowfish key and the download URL.
    pub sng_id: String,

    /// `MD5_ORIGIN`, empty when the session cannot stream the track.
    pub md5_origin: String,

    /// `MEDIA_VERSION`.
    pub media_version: String,

    /// `FILESIZE_*` per tier.
    pub sizes: FileSizes,

    /// `FALLBACK.SNG_ID`, when the track is served under another id.
    pub fallback_id: Option<String>,

    /// `ALB_PICTURE`, the album cover hash.
    pub album_picture: Option<String>,

    /// `SNG_TITLE`.
    pub title: String,

    /// `ART_NAME`.
    pub artist: String,
}

/// A synced lyric line.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedLyric {
    /// LRC timestamp, e.g. `[00:12.34]`. Missing for blank spacer lines.
    pub lrc_timestamp: Option<String>,

    /// Line text.
    pub line: String,
}

/// Lyrics from `song.getLyrics`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lyrics {
    /// Synced lines, empty when the provider only has plain text.
    pub synced: Vec<SyncedLyric>,

    /// Unsynced lyrics text.
    pub text: Option<String>,
}

impl Lyrics {
    /// Whether there is anything to write.
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty() && self.text.as_deref().map_or(true, str::is_empty)
    }
}
