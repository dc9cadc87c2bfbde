use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    /// Whether the failure was caused by the caller (validation, bad
    /// identifiers) rather than by this service or an upstream system.
    fn is_client_error(&self) -> bool;
    /// Whether the failure is a transient infrastructure condition that
    /// callers should absorb by degrading (no cache, no metrics) instead of
    /// failing the request.
    fn is_degradable(&self) -> bool;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Summarizer(e) => e.is_retryable(),
            CoreError::Pool(PoolError::Exhausted { .. }) => true,
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Summarizer(SummarizerError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput { .. } | CoreError::Config(ConfigError::InvalidValue { .. })
        )
    }

    fn is_degradable(&self) -> bool {
        matches!(
            self,
            CoreError::Cache(_) | CoreError::Pool(PoolError::Exhausted { .. })
        )
    }
}

impl RedditApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }
}

impl SummarizerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SummarizerError::RateLimitExceeded { .. }
                | SummarizerError::RequestTimeout
                | SummarizerError::ServiceUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_retryable_and_degradable() {
        let err = CoreError::Pool(PoolError::Exhausted { timeout_ms: 10_000 });
        assert!(err.is_retryable());
        assert!(err.is_degradable());
        assert!(!err.is_client_error());
    }

    #[test]
    fn validation_failure_is_client_error() {
        let err = CoreError::InvalidInput {
            message: "subreddit contains invalid characters".to_string(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_carries_retry_delay() {
        let err = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 42 });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn cache_failure_is_degradable_not_fatal() {
        let err = CoreError::Cache(CacheError::SharedTierUnavailable {
            reason: "connection refused".to_string(),
        });
        assert!(err.is_degradable());
        assert!(!err.is_retryable());
    }
}
