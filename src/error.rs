//! Error types for the download pipeline.

use thiserror::Error;

/// Main error type for all Deezer operations.
#[derive(Debug, Error)]
pub enum DeezerError {
    /// Invalid or expired credentials (ARL token).
    ///
    /// Fatal for the whole session: no private API call can succeed
    /// until a new login.
    #[error("Bad credentials: {0}")]
    BadCredentials(String),

    /// The anti-forgery token was rejected by the gateway.
    #[error("API token expired")]
    TokenExpired,

    /// Too many requests - rate limited.
    #[error("Quota exceeded: too many requests")]
    QuotaExceeded,

    /// Invalid link or identifier.
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// The resolved configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The chain of fallback ids was longer than allowed.
    #[error("Fallback chain for track {track_id} exceeded {max_depth} hops")]
    FallbackChainExceeded { track_id: String, max_depth: usize },

    /// Requested quality is not available.
    #[error("Quality not available: {0}")]
    QualityNotFound(String),

    /// HTTP request failed.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Server answered with a retryable or unexpected status.
    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// The response body is not the JSON envelope we expect.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Generic API error with message.
    #[error("API error: {0}")]
    ApiError(String),

    /// The media stream broke off; the partial file is kept for resume.
    #[error("Download interrupted: {0}")]
    Download(String),

    /// A resume request was answered with a different byte range.
    #[error("Server did not honor range starting at byte {requested}: {received}")]
    RangeNotHonored { requested: u64, received: String },

    /// The download was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    /// Tagging failed; for corrupt containers the output file was removed.
    #[error("Tag error: {0}")]
    TagError(String),

    /// JSON parsing failed.
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DeezerError {
    /// Whether re-running the same step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeezerError::RequestError(e) => !e.is_builder() && !e.is_decode(),
            DeezerError::HttpStatus { status, .. } => {
                crate::http::RETRY_STATUSES.contains(status)
            }
            DeezerError::Download(_) => true,
            _ => false,
        }
    }

    /// Whether the error must abort a whole batch instead of one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeezerError::BadCredentials(_) | DeezerError::InvalidConfig(_)
        )
    }
}

impl From<lofty::error::LoftyError> for DeezerError {
    fn from(e: lofty::error::LoftyError) -> Self {
        DeezerError::TagError(e.to_string())
    }
}

/// Result type alias for Deezer operations.
pub type Result<T> = std::result::Result<T, DeezerError>;
