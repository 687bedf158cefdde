//! Output path rendering from naming templates.
//!
//! Templates use `<Placeholder>` markers and `/` to separate directories,
//! e.g. `<Album Artist>/<Album>/<Track#> - <Title>`. Only the substituted
//! values are sanitized; separators written in the template are kept.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{DeezerError, Result};
use crate::models::{release_year, AlbumInfo, PlaylistContext, TrackInfo};

/// Default template for album, artist and single-track downloads.
pub const DEFAULT_TEMPLATE: &str = "<Album Artist>/<Album>/<Track#> - <Title>";

/// Default template for playlist downloads.
pub const DEFAULT_PLAYLIST_TEMPLATE: &str = "<Playlist Title>/<Track#> - <Title>";

/// Maximum size in bytes of one substituted value.
pub const MAX_VALUE_BYTES: usize = 250;

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

const TRACK_PLACEHOLDERS: &[&str] = &[
    "<Album Artist>",
    "<Artist>",
    "<Album>",
    "<Date>",
    "<Year>",
    "<Track#>",
    "<Disc#>",
    "<Title>",
    "<Label>",
    "<UPC>",
    "<Record Type>",
];

const PLAYLIST_PLACEHOLDERS: &[&str] = &["<Playlist Title>", "<Track#>", "<Title>"];

static TRACK_RE: OnceLock<Regex> = OnceLock::new();
static PLAYLIST_RE: OnceLock<Regex> = OnceLock::new();

/// One alternation of all placeholders, longest first, so that the
/// leftmost match always takes the longest placeholder.
fn placeholder_regex(cell: &'static OnceLock<Regex>, placeholders: &[&str]) -> Result<&'static Regex> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }

    let mut sorted = placeholders.to_vec();
    sorted.sort_by_key(|p| Reverse(p.len()));
    let pattern = sorted
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");

    let re = Regex::new(&pattern)
        .map_err(|e| DeezerError::InvalidConfig(format!("placeholder pattern: {}", e)))?;
    Ok(cell.get_or_init(|| re))
}

/// Replace filesystem-forbidden characters with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

/// Cut `value` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Sanitize and truncate one substituted value. Values made only of dots
/// would name the current or parent directory and become `_`.
fn clean(value: &str) -> String {
    let value = truncate_utf8(&sanitize(value), MAX_VALUE_BYTES).to_string();
    if !value.is_empty() && value.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    value
}

/// Render a relative output path (without extension) for a track.
///
/// With a playlist context only `<Playlist Title>`, `<Track#>` (the
/// position in the playlist) and `<Title>` are substituted; other
/// markers are left as written.
pub fn render_path(
    template: &str,
    track: &TrackInfo,
    album: &AlbumInfo,
    playlist: Option<&PlaylistContext>,
) -> Result<String> {
    let (re, values): (&Regex, HashMap<&str, String>) = match playlist {
        Some(ctx) => (
            placeholder_regex(&PLAYLIST_RE, PLAYLIST_PLACEHOLDERS)?,
            HashMap::from([
                ("<Playlist Title>", ctx.playlist.title.clone()),
                ("<Track#>", format!("{:02}", ctx.position)),
                ("<Title>", track.title.clone()),
            ]),
        ),
        None => (
            placeholder_regex(&TRACK_RE, TRACK_PLACEHOLDERS)?,
            HashMap::from([
                ("<Album Artist>", album.artist.name.clone()),
                ("<Artist>", track.artist.name.clone()),
                ("<Album>", track.album.title.clone()),
                ("<Date>", track.album.release_date.clone()),
                ("<Year>", release_year(&track.album.release_date).to_string()),
                ("<Track#>", format!("{:02}", track.track_position)),
                ("<Disc#>", format!("{:02}", track.disk_number)),
                ("<Title>", track.title.clone()),
                ("<Label>", album.label.clone()),
                ("<UPC>", album.upc.clone()),
                ("<Record Type>", album.record_type.clone()),
            ]),
        ),
    };

    let values: HashMap<&str, String> = values
        .into_iter()
        .map(|(k, v)| (k, clean(&v)))
        .collect();

    let rendered = re.replace_all(template, |caps: &Captures| {
        values.get(&caps[0]).cloned().unwrap_or_default()
    });

    Ok(rendered.into_owned())
}
