//! Collaborators the pipeline talks to but does not own.
//!
//! - [`TrackCache`]: remembers what was already downloaded, keyed by the
//!   canonical track link. [`MemoryCache`] is the in-process version.
//! - [`TagEnricher`]: descriptive tags for display. [`LastFmEnricher`]
//!   asks last.fm. These tags are never written into files.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DeezerError, Result};
use crate::http::{self, RetryPolicy};

/// A previously downloaded track.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Where the file was stored.
    pub path: PathBuf,
    pub performer: String,
    pub title: String,
    /// Times the track was served, starting at 1.
    pub download_count: u32,
    pub last_downloaded: SystemTime,
}

impl CacheEntry {
    /// A fresh entry, served once, now.
    pub fn new<S: Into<String>>(path: PathBuf, performer: S, title: S) -> Self {
        Self {
            path,
            performer: performer.into(),
            title: title.into(),
            download_count: 1,
            last_downloaded: SystemTime::now(),
        }
    }
}

/// Cache of downloaded tracks, keyed by canonical link.
pub trait TrackCache {
    fn lookup(&self, link: &str) -> impl Future<Output = Result<Option<CacheEntry>>> + Send;

    /// Insert an entry, or refresh path/performer/title of an existing one
    /// and count one more download.
    fn record(&self, link: &str, entry: CacheEntry) -> impl Future<Output = Result<()>> + Send;

    /// Count one more download of an existing entry.
    fn touch(&self, link: &str) -> impl Future<Output = Result<()>> + Send;
}

/// In-process [`TrackCache`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl TrackCache for MemoryCache {
    async fn lookup(&self, link: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(link).cloned())
    }

    async fn record(&self, link: &str, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(link) {
            Some(existing) => {
                existing.path = entry.path;
                existing.performer = entry.performer;
                existing.title = entry.title;
                existing.download_count += 1;
                existing.last_downloaded = SystemTime::now();
            }
            None => {
                entries.insert(link.to_string(), entry);
            }
        }
        Ok(())
    }

    async fn touch(&self, link: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(link)
            .ok_or_else(|| DeezerError::ApiError(format!("{} is not cached", link)))?;
        entry.download_count += 1;
        entry.last_downloaded = SystemTime::now();
        Ok(())
    }
}

/// Source of descriptive tags for a song.
pub trait TagEnricher {
    /// Tags for `artist` / `title`, or `None` when the source has nothing.
    fn tags(&self, artist: &str, title: &str) -> impl Future<Output = Option<Vec<String>>> + Send;
}

const LASTFM_URL: &str = "http://ws.audioscrobbler.com/2.0/";

/// Top tags of a track from last.fm (`track.getInfo`).
#[derive(Debug, Clone)]
pub struct LastFmEnricher {
    client: Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl LastFmEnricher {
    pub fn new<S: Into<String>>(api_key: S, retry: RetryPolicy) -> Result<Self> {
        Self::with_endpoint(api_key, LASTFM_URL, retry)
    }

    pub fn with_endpoint<S: Into<String>>(
        api_key: S,
        endpoint: &str,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = http::client_builder()
            .build()
            .map_err(|e| DeezerError::ApiError(format!("Failed to create client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.to_string(),
            retry,
        })
    }

    async fn track_info(&self, artist: &str, title: &str) -> Result<Value> {
        let request = self.client.get(&self.endpoint).query(&[
            ("method", "track.getInfo"),
            ("api_key", self.api_key.as_str()),
            ("artist", artist),
            ("track", title),
            ("format", "json"),
        ]);
        let response = http::send_with_retry(&self.retry, request).await?;
        Ok(response.json().await?)
    }
}

fn top_tags(info: &Value) -> Option<Vec<String>> {
    let tags = info.get("track")?.get("toptags")?.get("tag")?.as_array()?;
    Some(
        tags.iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect(),
    )
}

impl TagEnricher for LastFmEnricher {
    async fn tags(&self, artist: &str, title: &str) -> Option<Vec<String>> {
        match self.track_info(artist, title).await {
            Ok(info) => top_tags(&info),
            Err(e) => {
                debug!("last.fm lookup for {} - {} failed: {}", artist, title, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockServer, Reply};

    #[tokio::test]
    async fn test_memory_cache_counts_downloads() {
        let cache = MemoryCache::new();
        let link = "https://www.deezer.com/track/1";

        assert_eq!(cache.lookup(link).await.unwrap(), None);
        assert!(cache.touch(link).await.is_err());

        cache
            .record(link, CacheEntry::new(PathBuf::from("a.mp3"), "Adele", "Hello"))
            .await
            .unwrap();
        let first = cache.lookup(link).await.unwrap().unwrap();
        assert_eq!(first.download_count, 1);

        cache.touch(link).await.unwrap();
        cache
            .record(link, CacheEntry::new(PathBuf::from("b.mp3"), "Adele", "Hello"))
            .await
            .unwrap();

        let entry = cache.lookup(link).await.unwrap().unwrap();
        assert_eq!(entry.download_count, 3);
        assert_eq!(entry.path, PathBuf::from("b.mp3"));
        assert!(entry.last_downloaded >= first.last_downloaded);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_lastfm_top_tags() {
        let server = MockServer::start(vec![Reply::json(
            r#"{"track":{"name":"Hello","toptags":{"tag":[{"name":"soul","url":"x"},{"name":"pop","url":"y"}]}}}"#,
        )])
        .await;
        let enricher =
            LastFmEnricher::with_endpoint("key", &server.url("/2.0/"), RetryPolicy::none()).unwrap();

        let tags = enricher.tags("adele", "hello").await;
        assert_eq!(tags, Some(vec!["soul".to_string(), "pop".to_string()]));

        let target = &server.requests()[0].target;
        assert!(target.contains("method=track.getInfo"));
        assert!(target.contains("artist=adele"));
        assert!(target.contains("track=hello"));
    }

    #[tokio::test]
    async fn test_lastfm_unavailable() {
        let server = MockServer::start(vec![
            Reply::json(r#"{"error":6,"message":"Track not found"}"#),
            Reply::bytes(b"not json".to_vec()),
        ])
        .await;
        let enricher =
            LastFmEnricher::with_endpoint("key", &server.url("/2.0/"), RetryPolicy::none()).unwrap();

        assert_eq!(enricher.tags("nobody", "nothing").await, None);
        assert_eq!(enricher.tags("nobody", "nothing").await, None);
    }
}
