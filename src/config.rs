//! Resolved download settings.
//!
//! Loading (files, environment) belongs to the caller; the CLI fills this
//! from its arguments. [`Config::validate`] must pass before a
//! [`crate::Deezdl`] is built.

use std::path::PathBuf;

use serde::Deserialize;

use crate::api::gateway::DEFAULT_MAX_FALLBACK_DEPTH;
use crate::error::{DeezerError, Result};
use crate::http::RetryPolicy;
use crate::naming::{DEFAULT_PLAYLIST_TEMPLATE, DEFAULT_TEMPLATE};
use crate::quality::QualityTier;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `arl` session cookie of a logged-in account.
    pub arl: String,

    /// Requested quality, 1 = lossless .. 4 = lowest.
    pub quality: u8,

    /// Naming template for album, artist and track downloads.
    pub naming_template: String,

    /// Naming template for playlist downloads.
    pub playlist_naming_template: String,

    pub embed_cover_art: bool,

    pub fetch_lyrics: bool,

    /// Root the rendered paths are relative to.
    pub output_dir: PathBuf,

    /// Tracks downloaded at once within a batch.
    pub concurrency: usize,

    /// Fallback ids followed before a track is given up.
    pub max_fallback_depth: usize,

    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arl: String::new(),
            quality: 2,
            naming_template: DEFAULT_TEMPLATE.to_string(),
            playlist_naming_template: DEFAULT_PLAYLIST_TEMPLATE.to_string(),
            embed_cover_art: true,
            fetch_lyrics: false,
            output_dir: PathBuf::from("downloads"),
            concurrency: 1,
            max_fallback_depth: DEFAULT_MAX_FALLBACK_DEPTH,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Defaults with the given session token.
    pub fn with_arl<S: Into<String>>(arl: S) -> Self {
        Self {
            arl: arl.into(),
            ..Self::default()
        }
    }

    /// The requested quality tier.
    pub fn quality_tier(&self) -> Result<QualityTier> {
        QualityTier::from_setting(self.quality)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.arl.trim().is_empty() {
            return Err(DeezerError::InvalidConfig("arl token is empty".to_string()));
        }
        self.quality_tier()?;
        if self.naming_template.trim().is_empty() {
            return Err(DeezerError::InvalidConfig(
                "naming template is empty".to_string(),
            ));
        }
        if self.playlist_naming_template.trim().is_empty() {
            return Err(DeezerError::InvalidConfig(
                "playlist naming template is empty".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(DeezerError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
