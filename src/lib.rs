//! # deezdl
//!
//! A resumable Deezer track downloader: stripe decryption, quality
//! negotiation, tagging and template-based file naming.
//!
//! ## Quick Start
//!
//! The easiest way to use this library is through the [`Deezdl`] struct:
//!
//! ```rust,no_run
//! use deezdl::{Config, Deezdl, Link};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::with_arl("your_arl_token");
//!     config.quality = 1;
//!     let dz = Deezdl::new(config).await?;
//!
//!     // Download a single track
//!     let outcome = dz.download_track("3135556", None).await?;
//!     println!("{:?}", outcome.path());
//!
//!     // Download an entire album
//!     let report = dz.download_link(&Link::parse("https://www.deezer.com/album/302127")?).await?;
//!     println!("{}/{} tracks", report.completed(), report.total());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Tracks, albums, artists and playlists** with automatic decryption
//! - **Four quality tiers** (FLAC, MP3 320/256/128) with downgrade
//! - **Resume** of interrupted downloads from the partial file
//! - **Tags, cover art and lyrics** written next to the audio
//!
//! ## Low-Level APIs
//!
//! - [`DeezerApi`] - Public API for metadata (no auth required)
//! - [`GatewayApi`] - Private API for downloads (requires ARL token)
//! - [`crypto`] - URL cipher and stripe decryption
//! - [`stream`] - Resumable decrypting download

pub mod api;
pub mod collab;
pub mod config;
pub mod converters;
pub mod crypto;
mod deezdl;
pub mod error;
pub mod http;
pub mod link;
pub mod models;
pub mod naming;
pub mod quality;
pub mod stream;
pub mod tagging;

#[cfg(test)]
mod testutil;

// Main interface (recommended)
pub use deezdl::{
    BatchReport, Deezdl, DownloadedTrack, ItemReport, SkipReason, StoredTrack, TrackOutcome,
};

pub use api::{DeezerApi, GatewayApi, Session};
pub use collab::{CacheEntry, LastFmEnricher, MemoryCache, TagEnricher, TrackCache};
pub use config::Config;
pub use error::{DeezerError, Result};
pub use link::{Link, MediaType};
pub use quality::QualityTier;
