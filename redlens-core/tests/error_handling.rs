use redlens_core::{
    CacheError, ConfigError, CoreError, ErrorExt, PoolError, RedditApiError, ScraperError,
    SummarizerError,
};
use std::time::Duration;

#[test]
fn test_retryable_errors() {
    let retryable = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable.is_retryable());

    let retryable = CoreError::Summarizer(SummarizerError::ServiceUnavailable);
    assert!(retryable.is_retryable());

    let non_retryable = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert!(!non_retryable.is_retryable());

    let non_retryable = CoreError::Scraper(ScraperError::RestrictedPort { port: 22 });
    assert!(!non_retryable.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(rate_limit.retry_after(), Some(Duration::from_secs(60)));

    let timeout = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout.retry_after(), Some(Duration::from_secs(30)));

    let validation = CoreError::InvalidInput {
        message: "bad topic".to_string(),
    };
    assert_eq!(validation.retry_after(), None);
}

#[test]
fn test_failure_taxonomy() {
    // Transient infrastructure failures degrade, they do not fail the request.
    let cache_down = CoreError::Cache(CacheError::SharedTierUnavailable {
        reason: "refused".to_string(),
    });
    assert!(cache_down.is_degradable());

    // Pool exhaustion is distinguishable from a generic connection failure.
    let exhausted = CoreError::Pool(PoolError::Exhausted { timeout_ms: 10_000 });
    let conn_failed = CoreError::Pool(PoolError::Connection {
        reason: "refused".to_string(),
    });
    assert!(exhausted.is_degradable());
    assert!(!conn_failed.is_degradable());

    // Validation failures are attributed to the caller.
    let validation = CoreError::InvalidInput {
        message: "subreddit too long".to_string(),
    };
    assert!(validation.is_client_error());
    assert!(!cache_down.is_client_error());
}

#[test]
fn test_error_display_is_descriptive() {
    let err = CoreError::RedditApi(RedditApiError::SubredditNotFound {
        subreddit: "rust".to_string(),
    });
    assert!(err.to_string().contains("rust"));

    let err = CoreError::Pool(PoolError::Exhausted { timeout_ms: 5000 });
    assert!(err.to_string().contains("5000"));
}
