use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Summarizer error: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("Scraper error: {0}")]
    Scraper(#[from] ScraperError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Post not found: {post_id}")]
    PostNotFound { post_id: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {reason}")]
    MigrationFailed { reason: String },

    #[error("Query execution failed: {operation}")]
    QueryFailed { operation: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool exhausted: no connection available within {timeout_ms}ms")]
    Exhausted { timeout_ms: u64 },

    #[error("Connection failure: {reason}")]
    Connection { reason: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Shared cache unavailable: {reason}")]
    SharedTierUnavailable { reason: String },

    #[error("Shared cache call timed out after {millis}ms")]
    SharedTierTimeout { millis: u64 },

    #[error("Cache payload serialization failed: {reason}")]
    Payload { reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum SummarizerError {
    #[error("Provider authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("Invalid response format: {details}")]
    InvalidResponse { details: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Provider service unavailable")]
    ServiceUnavailable,
}

#[derive(Error, Debug, Clone)]
pub enum ScraperError {
    #[error("Invalid URL format: {reason}")]
    InvalidUrl { reason: String },

    #[error("URL scheme '{scheme}' is not supported")]
    UnsupportedScheme { scheme: String },

    #[error("Restricted network target: {detail}")]
    RestrictedNetwork { detail: String },

    #[error("Restricted port: {port}")]
    RestrictedPort { port: u16 },

    #[error("Security violation: {detail}")]
    SecurityViolation { detail: String },

    #[error("Fetch failed: {reason}")]
    FetchFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
