//! Gateway API client for authenticated Deezer operations.
//!
//! This module provides a client for the Deezer Gateway API
//! (deezer.com/ajax/gw-light.php), which requires an authenticated
//! [`Session`] and provides the decryption parameters of tracks.

use std::future::Future;

use reqwest::{cookie::Jar, Client, Url};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::converters;
use crate::error::{DeezerError, Result};
use crate::http::{self, RetryPolicy};
use crate::models::{Lyrics, PrivateTrackInfo};

/// Gateway API private endpoint.
const GATEWAY_URL: &str = "https://www.deezer.com/ajax/gw-light.php";

/// Origin the `arl` cookie is set for.
const COOKIE_ORIGIN: &str = "https://www.deezer.com";

/// Login method; always called with the `null` token sentinel.
const USER_DATA_METHOD: &str = "deezer.getUserData";

/// Default number of fallback hops followed when resolving a track.
pub const DEFAULT_MAX_FALLBACK_DEPTH: usize = 3;

#[derive(Debug, Default)]
struct Credentials {
    api_token: String,
    user_id: u64,
}

/// An authenticated gateway session.
///
/// Holds the `arl` cookie (inside the HTTP client's jar) and the
/// anti-forgery token returned by `deezer.getUserData`. Sessions live for
/// the process lifetime and are never persisted.
#[derive(Debug)]
pub struct Session {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
    credentials: RwLock<Credentials>,
}

impl Session {
    /// Log in with an ARL token.
    ///
    /// # Errors
    ///
    /// Returns `BadCredentials` if the ARL token is invalid or expired.
    pub async fn login(arl: &str, retry: RetryPolicy) -> Result<Self> {
        Self::login_at(GATEWAY_URL, arl, retry).await
    }

    /// Log in against a specific gateway endpoint.
    pub async fn login_at(endpoint: &str, arl: &str, retry: RetryPolicy) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let origin = COOKIE_ORIGIN
            .parse::<Url>()
            .map_err(|e| DeezerError::ApiError(format!("Invalid cookie origin: {}", e)))?;
        jar.add_cookie_str(&format!("arl={}", arl), &origin);

        let client = http::client_builder()
            .cookie_provider(jar)
            .build()
            .map_err(|e| DeezerError::ApiError(format!("Failed to create client: {}", e)))?;

        let session = Self {
            client,
            endpoint: endpoint.to_string(),
            retry,
            credentials: RwLock::new(Credentials::default()),
        };
        session.refresh().await?;

        Ok(session)
    }

    /// Re-derive the anti-forgery token from `deezer.getUserData`.
    pub async fn refresh(&self) -> Result<()> {
        let user_data = self.post(USER_DATA_METHOD, &json!({})).await?;

        let user_id = user_data
            .get("USER")
            .and_then(|u| u.get("USER_ID"))
            .and_then(|id| {
                id.as_u64()
                    .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
            })
            .unwrap_or(0);

        if user_id == 0 {
            return Err(DeezerError::BadCredentials(
                "ARL token is invalid or expired".to_string(),
            ));
        }

        let api_token = user_data
            .get("checkForm")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                DeezerError::MalformedResponse("getUserData has no checkForm token".to_string())
            })?
            .to_string();

        info!("Gateway session authenticated. User ID: {}", user_id);

        *self.credentials.write().await = Credentials { api_token, user_id };
        Ok(())
    }

    /// Logged-in user id.
    pub async fn user_id(&self) -> u64 {
        self.credentials.read().await.user_id
    }

    /// Make one request to the Gateway API and unwrap its envelope.
    async fn post(&self, method: &str, body: &Value) -> Result<Value> {
        let api_token = if method == USER_DATA_METHOD {
            "null".to_string()
        } else {
            self.credentials.read().await.api_token.clone()
        };

        let params = [
            ("api_version", "1.0"),
            ("api_token", api_token.as_str()),
            ("input", "3"),
            ("method", method),
        ];

        let request = self.client.post(&self.endpoint).query(&params).json(body);
        let response = http::send_with_retry(&self.retry, request).await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Value = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(200).collect();
            error!(
                "Failed to parse Gateway response (status {}): {}",
                status, preview
            );
            DeezerError::MalformedResponse(format!("status {}: {}", status, e))
        })?;

        if let Some(err) = envelope.get("error").filter(|e| has_error(e)) {
            if err.get("VALID_TOKEN_REQUIRED").is_some() {
                return Err(DeezerError::TokenExpired);
            }
            let error_msg = err.to_string();
            error!("Gateway API error on {}: {}", method, error_msg);
            return Err(DeezerError::ApiError(error_msg));
        }

        envelope
            .get("results")
            .cloned()
            .ok_or_else(|| DeezerError::MalformedResponse(format!("{} returned no results", method)))
    }
}

/// The gateway reports success as `"error": []` and failures as a
/// non-empty object.
fn has_error(error: &Value) -> bool {
    match error {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Source of `deezer.pageTrack` data, keyed by `SNG_ID`.
pub trait PageTrackSource {
    /// The `DATA` object for a track id.
    fn page_track(&self, sng_id: &str) -> impl Future<Output = Result<Value>> + Send;
}

/// Resolve private track info, following `FALLBACK` ids.
///
/// At most `max_depth` fallbacks are followed; a longer chain (including a
/// cycle) is a `FallbackChainExceeded` error.
pub async fn resolve_private_info<S: PageTrackSource + Sync>(
    source: &S,
    sng_id: &str,
    max_depth: usize,
) -> Result<PrivateTrackInfo> {
    let mut current = sng_id.to_string();

    for _ in 0..=max_depth {
        let data = source.page_track(&current).await?;
        let info = converters::parse_private_info(&data)?;

        match info.fallback_id {
            Some(next) => {
                debug!("Track {} falls back to {}", current, next);
                current = next;
            }
            None => return Ok(info),
        }
    }

    warn!("Giving up on fallback chain of track {}", sng_id);
    Err(DeezerError::FallbackChainExceeded {
        track_id: sng_id.to_string(),
        max_depth,
    })
}

/// Gateway API client over an authenticated [`Session`].
///
/// Provides:
/// - Private track data for decryption (`deezer.pageTrack`)
/// - Lyrics (`song.getLyrics`)
///
/// # Example
///
/// ```rust,no_run
/// use deezdl::api::{GatewayApi, Session};
/// use deezdl::http::RetryPolicy;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = Session::login("your_arl_token_here", RetryPolicy::default()).await?;
///     let gw = GatewayApi::new(session);
///     let info = gw.resolve_track("3135556", 3).await?;
///     println!("Origin: {}", info.md5_origin);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct GatewayApi {
    session: Session,
}

impl GatewayApi {
    /// Wrap an authenticated session.
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Call a gateway method, re-deriving the token once if it expired.
    pub async fn call(&self, method: &str, body: Value) -> Result<Value> {
        match self.session.post(method, &body).await {
            Err(DeezerError::TokenExpired) => {
                warn!("API token expired, refreshing session");
                self.session.refresh().await?;
                self.session.post(method, &body).await
            }
            other => other,
        }
    }

    /// Resolve the private info of a track, following fallbacks.
    pub async fn resolve_track(&self, sng_id: &str, max_depth: usize) -> Result<PrivateTrackInfo> {
        resolve_private_info(self, sng_id, max_depth).await
    }

    /// Get lyrics for a song.
    pub async fn get_lyrics(&self, sng_id: &str) -> Result<Lyrics> {
        let result = self
            .call("song.getLyrics", json!({ "sng_id": sng_id }))
            .await?;
        Ok(converters::parse_lyrics(&result))
    }
}

impl PageTrackSource for GatewayApi {
    async fn page_track(&self, sng_id: &str) -> Result<Value> {
        let result = self
            .call("deezer.pageTrack", json!({ "SNG_ID": sng_id }))
            .await?;

        result.get("DATA").cloned().ok_or_else(|| {
            DeezerError::MalformedResponse(format!("pageTrack for {} has no DATA", sng_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockServer, Reply};
    use std::collections::HashMap;

    fn user_data(user_id: u64, token: &str) -> Reply {
        Reply::json(
            &json!({
                "error": [],
                "results": { "USER": { "USER_ID": user_id }, "checkForm": token }
            })
            .to_string(),
        )
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            retries: 1,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_login_uses_null_token() {
        let server = MockServer::start(vec![user_data(42, "csrf-1")]).await;
        let session = Session::login_at(&server.url("/gw"), "arl", fast())
            .await
            .unwrap();

        assert_eq!(session.user_id().await, 42);
        let req = &server.requests()[0];
        assert_eq!(req.method, "POST");
        assert!(req.target.contains("api_token=null"));
        assert!(req.target.contains("method=deezer.getUserData"));
    }

    #[tokio::test]
    async fn test_login_rejects_missing_user() {
        let server = MockServer::start(vec![user_data(0, "csrf")]).await;
        let err = Session::login_at(&server.url("/gw"), "bad", fast())
            .await
            .unwrap_err();
        assert!(matches!(err, DeezerError::BadCredentials(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_calls_carry_token_and_body() {
        let server = MockServer::start(vec![
            user_data(42, "csrf-1"),
            Reply::json(r#"{"error":[],"results":{"DATA":{"SNG_ID":"7","MD5_ORIGIN":"ab"}}}"#),
        ])
        .await;
        let gw = GatewayApi::new(
            Session::login_at(&server.url("/gw"), "arl", fast())
                .await
                .unwrap(),
        );

        let info = gw.resolve_track("7", 3).await.unwrap();
        assert_eq!(info.md5_origin, "ab");

        let req = &server.requests()[1];
        assert!(req.target.contains("api_token=csrf-1"));
        assert!(req.target.contains("method=deezer.pageTrack"));
        assert_eq!(req.json()["SNG_ID"], "7");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockServer::start(vec![
            user_data(42, "csrf-1"),
            Reply::json(r#"{"error":{"VALID_TOKEN_REQUIRED":"Invalid CSRF token"},"results":{}}"#),
            user_data(42, "csrf-2"),
            Reply::json(r#"{"error":[],"results":{"ok":true}}"#),
        ])
        .await;
        let gw = GatewayApi::new(
            Session::login_at(&server.url("/gw"), "arl", fast())
                .await
                .unwrap(),
        );

        let result = gw.call("song.getData", json!({})).await.unwrap();
        assert_eq!(result["ok"], true);
        assert!(server.requests()[3].target.contains("api_token=csrf-2"));
    }

    #[tokio::test]
    async fn test_error_envelope_is_not_retried() {
        let server = MockServer::start(vec![
            user_data(42, "csrf-1"),
            Reply::json(r#"{"error":{"DATA_ERROR":"song_id"},"results":{}}"#),
        ])
        .await;
        let gw = GatewayApi::new(
            Session::login_at(&server.url("/gw"), "arl", fast())
                .await
                .unwrap(),
        );

        let err = gw.get_lyrics("1").await.unwrap_err();
        assert!(matches!(err, DeezerError::ApiError(_)));
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_non_json_is_malformed() {
        let server = MockServer::start(vec![
            user_data(42, "csrf-1"),
            Reply::bytes(b"<html>maintenance</html>".to_vec()),
        ])
        .await;
        let gw = GatewayApi::new(
            Session::login_at(&server.url("/gw"), "arl", fast())
                .await
                .unwrap(),
        );

        let err = gw.call("deezer.pageTrack", json!({})).await.unwrap_err();
        assert!(matches!(err, DeezerError::MalformedResponse(_)));
    }

    struct Pages(HashMap<&'static str, Value>);

    impl PageTrackSource for Pages {
        async fn page_track(&self, sng_id: &str) -> Result<Value> {
            self.0
                .get(sng_id)
                .cloned()
                .ok_or_else(|| DeezerError::ApiError(format!("unknown {}", sng_id)))
        }
    }

    #[tokio::test]
    async fn test_fallback_is_followed() {
        let pages = Pages(HashMap::from([
            ("1", json!({ "SNG_ID": "1", "FALLBACK": { "SNG_ID": "2" } })),
            ("2", json!({ "SNG_ID": "2", "MD5_ORIGIN": "cafe" })),
        ]));

        let info = resolve_private_info(&pages, "1", 3).await.unwrap();
        assert_eq!(info.sng_id, "2");
        assert_eq!(info.md5_origin, "cafe");
    }

    #[tokio::test]
    async fn test_fallback_chain_is_bounded() {
        let pages = Pages(HashMap::from([
            ("1", json!({ "SNG_ID": "1", "FALLBACK": { "SNG_ID": "2" } })),
            ("2", json!({ "SNG_ID": "2", "FALLBACK": { "SNG_ID": "3" } })),
            ("3", json!({ "SNG_ID": "3", "FALLBACK": { "SNG_ID": "4" } })),
            ("4", json!({ "SNG_ID": "4" })),
        ]));

        assert_eq!(resolve_private_info(&pages, "1", 3).await.unwrap().sng_id, "4");

        let err = resolve_private_info(&pages, "1", 2).await.unwrap_err();
        assert!(matches!(
            err,
            DeezerError::FallbackChainExceeded { max_depth: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_fallback_cycle_is_bounded() {
        let pages = Pages(HashMap::from([(
            "1",
            json!({ "SNG_ID": "1", "FALLBACK": { "SNG_ID": "1" } }),
        )]));

        let err = resolve_private_info(&pages, "1", 3).await.unwrap_err();
        assert!(matches!(err, DeezerError::FallbackChainExceeded { .. }));
    }
}
