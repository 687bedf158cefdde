//! Shared HTTP helpers: client construction and bounded retry.
//!
//! Every public and private API call, and the initial media request, goes
//! through [`send_with_retry`]. A failed attempt is retried on transport
//! errors and on the statuses in [`RETRY_STATUSES`], with an exponential
//! backoff.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{DeezerError, Result};

/// Browser user agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Statuses that trigger a retry.
pub const RETRY_STATUSES: &[u16] = &[500, 502, 504];

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base delay in milliseconds; doubled for each further retry.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_ms: 300,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Build a client with the shared user agent.
pub fn client_builder() -> reqwest::ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}

/// Send a request, retrying transport errors and retryable statuses.
///
/// The request is cloned for every attempt, so bodies must be buffered
/// (JSON or form bodies are). The final response is returned even when its
/// status is an error other than the retryable ones; callers decide.
pub async fn send_with_retry(policy: &RetryPolicy, request: RequestBuilder) -> Result<Response> {
    let mut attempt = 0;
    loop {
        let req = request
            .try_clone()
            .ok_or_else(|| DeezerError::ApiError("request body is not cloneable".to_string()))?;

        let err = match req.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if !RETRY_STATUSES.contains(&status) {
                    return Ok(response);
                }
                DeezerError::HttpStatus {
                    status,
                    url: response.url().to_string(),
                }
            }
            Err(e) if e.is_builder() => return Err(e.into()),
            Err(e) => e.into(),
        };

        if attempt >= policy.retries {
            warn!("Giving up after {} attempts: {}", attempt + 1, err);
            return Err(err);
        }

        attempt += 1;
        let delay = policy.delay(attempt);
        debug!("Retry {} in {:?} after: {}", attempt, delay, err);
        tokio::time::sleep(delay).await;
    }
}
