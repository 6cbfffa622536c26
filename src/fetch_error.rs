#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("API authentication failed")]
    AuthFailed,
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },
}

impl FetchError {
    /// Whether a retry with backoff can plausibly succeed. Auth failures
    /// and client errors are permanent; rate limits and server errors are
    /// not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited => true,
            FetchError::Api { status, .. } => *status >= 500,
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::AuthFailed => false,
        }
    }
}
