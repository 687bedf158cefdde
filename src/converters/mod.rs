//! Gateway JSON to model converters.
//!
//! The private API sends upper-case keys and mixes strings and numbers for
//! the same field depending on the endpoint, so these records are built
//! by hand rather than derived.

use serde_json::Value;

use crate::error::{DeezerError, Result};
use crate::models::{FileSizes, Lyrics, PrivateTrackInfo, SyncedLyric};

/// Get string from JSON, returning empty string if not found.
fn get_str(json: &Value, key: &str) -> String {
    json.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Get string ID from JSON (handles both string and numeric IDs).
fn get_id(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(|v| {
        if let Some(s) = v.as_str() {
            Some(s.to_string())
        } else if let Some(n) = v.as_u64() {
            Some(n.to_string())
        } else {
            v.as_i64().map(|n| n.to_string())
        }
    })
}

/// Get a size from JSON (handles "123", 123 and missing).
fn get_size(json: &Value, key: &str) -> u64 {
    match json.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse the `DATA` object of a `deezer.pageTrack` response.
pub fn parse_private_info(data: &Value) -> Result<PrivateTrackInfo> {
    let sng_id = get_id(data, "SNG_ID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DeezerError::MalformedResponse("pageTrack DATA has no SNG_ID".into()))?;

    let fallback_id = data
        .get("FALLBACK")
        .and_then(|f| get_id(f, "SNG_ID"))
        .filter(|id| !id.is_empty());

    let album_picture = Some(get_str(data, "ALB_PICTURE")).filter(|p| !p.is_empty());

    Ok(PrivateTrackInfo {
        sng_id,
        md5_origin: get_str(data, "MD5_ORIGIN"),
        media_version: get_id(data, "MEDIA_VERSION").unwrap_or_else(|| "1".to_string()),
        sizes: FileSizes {
            flac: get_size(data, "FILESIZE_FLAC"),
            mp3_320: get_size(data, "FILESIZE_MP3_320"),
            mp3_256: get_size(data, "FILESIZE_MP3_256"),
            mp3_128: get_size(data, "FILESIZE_MP3_128"),
        },
        fallback_id,
        album_picture,
        title: get_str(data, "SNG_TITLE"),
        artist: get_str(data, "ART_NAME"),
    })
}

/// Parse a `song.getLyrics` result.
pub fn parse_lyrics(json: &Value) -> Lyrics {
    let synced = json
        .get("LYRICS_SYNC_JSON")
        .and_then(|s| s.as_array())
        .map(|lines| {
            lines
                .iter()
                .map(|line| SyncedLyric {
                    lrc_timestamp: line
                        .get("lrc_timestamp")
                        .and_then(|t| t.as_str())
                        .map(|t| t.to_string()),
                    line: get_str(line, "line"),
                })
                .collect()
        })
        .unwrap_or_default();

    Lyrics {
        synced,
        text: json
            .get("LYRICS_TEXT")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string()),
    }
}
