//! Error types

use thiserror::Error;

/// Quote fetch errors
///
/// Every variant is recovered inside the owning updater loop; none of these
/// ever crosses a task boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Rate limited, gave up after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
}

impl FetchError {
    /// A 429 is the only status that triggers the fetcher's retry policy.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::Status(429))
    }
}

/// Result type alias
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(FetchError::Status(429).is_rate_limit());
        assert!(!FetchError::Status(500).is_rate_limit());
        assert!(!FetchError::Timeout.is_rate_limit());
    }
}
