//! Provider link parsing.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DeezerError, Result};

const LINK_PATTERN: &str =
    r"^(?:https?://)?(?:www\.)?deezer\.com/(?:[^/]+/)?(track|album|artist|playlist)/([0-9]+)/?$";

static LINK_RE: OnceLock<Regex> = OnceLock::new();

fn link_regex() -> Result<&'static Regex> {
    if let Some(re) = LINK_RE.get() {
        return Ok(re);
    }
    let re = Regex::new(LINK_PATTERN)
        .map_err(|e| DeezerError::InvalidLink(format!("link pattern: {}", e)))?;
    Ok(LINK_RE.get_or_init(|| re))
}

/// Kind of provider entity a link points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Track,
    Album,
    Artist,
    Playlist,
}

impl MediaType {
    /// Path segment used in provider URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Track => "track",
            MediaType::Album => "album",
            MediaType::Artist => "artist",
            MediaType::Playlist => "playlist",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = DeezerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "track" => Ok(MediaType::Track),
            "album" => Ok(MediaType::Album),
            "artist" => Ok(MediaType::Artist),
            "playlist" => Ok(MediaType::Playlist),
            other => Err(DeezerError::InvalidLink(format!(
                "unknown media type '{}'",
                other
            ))),
        }
    }
}

/// A validated reference to a provider entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub media_type: MediaType,
    pub id: String,
}

impl Link {
    /// Parse a provider URL such as `https://www.deezer.com/en/album/302127`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLink` for anything that is not a track, album,
    /// artist or playlist link with a numeric id.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let caps = link_regex()?
            .captures(url)
            .ok_or_else(|| DeezerError::InvalidLink(url.to_string()))?;

        Ok(Self {
            media_type: caps[1].parse()?,
            id: caps[2].to_string(),
        })
    }

    /// Build a link from a bare numeric identifier.
    pub fn from_id(media_type: MediaType, id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DeezerError::InvalidLink(format!(
                "'{}' is not a numeric {} id",
                id, media_type
            )));
        }
        Ok(Self {
            media_type,
            id: id.to_string(),
        })
    }

    /// Canonical provider URL.
    pub fn url(&self) -> String {
        format!("https://www.deezer.com/{}/{}", self.media_type, self.id)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_links() {
        let link = Link::parse("https://www.deezer.com/en/album/302127").unwrap();
        assert_eq!(link.media_type, MediaType::Album);
        assert_eq!(link.id, "302127");

        let link = Link::parse("deezer.com/track/3135556").unwrap();
        assert_eq!(link.media_type, MediaType::Track);

        let link = Link::parse("http://deezer.com/playlist/908622995/").unwrap();
        assert_eq!(link.media_type, MediaType::Playlist);
        assert_eq!(link.url(), "https://www.deezer.com/playlist/908622995");
    }

    #[test]
    fn test_rejects_other_links() {
        for url in [
            "",
            "https://www.deezer.com/en/",
            "https://www.deezer.com/show/123",
            "https://www.deezer.com/track/abc",
            "https://open.spotify.com/track/3135556",
            "https://www.deezer.com/track/12?utm=x",
        ] {
            assert!(
                matches!(Link::parse(url), Err(DeezerError::InvalidLink(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_from_id() {
        let link = Link::from_id(MediaType::Artist, "27").unwrap();
        assert_eq!(link.url(), "https://www.deezer.com/artist/27");
        assert!(Link::from_id(MediaType::Track, "27a").is_err());
        assert!(Link::from_id(MediaType::Track, "").is_err());
        assert_eq!("Album".parse::<MediaType>().unwrap(), MediaType::Album);
    }
}
