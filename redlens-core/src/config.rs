//! Application configuration loaded from a TOML file with environment
//! variable overrides. Constructed once at startup and passed by reference
//! to the services that need it.

use crate::error::{ConfigError, CoreError};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub hot_posts_limit: u32,
    pub relevant_posts_limit: u32,
    pub top_comments_limit: u32,
    pub max_valid_posts: usize,
    pub api_timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "redlens/0.1 (update tracking)".to_string(),
            hot_posts_limit: 25,
            relevant_posts_limit: 15,
            top_comments_limit: 15,
            max_valid_posts: 5,
            api_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            fallback_model: "gpt-4o-mini".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            max_retries: 3,
            retry_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "redlens-scraper/0.1".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub checkout_timeout_secs: u64,
    pub recycle_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub enable_pool_monitoring: bool,
    pub pool_utilization_threshold: f64,
    pub overflow_ratio_warning: f64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://redlens.db".to_string(),
            pool_size: 10,
            max_overflow: 20,
            checkout_timeout_secs: 10,
            recycle_secs: 300,
            heartbeat_interval_secs: 30,
            enable_pool_monitoring: true,
            pool_utilization_threshold: 0.8,
            overflow_ratio_warning: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_secs: u64,
    pub check_run_ttl_secs: u64,
    pub trending_ttl_secs: u64,
    pub shared_tier_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 2000,
            default_ttl_secs: 300,
            check_run_ttl_secs: 600,
            trending_ttl_secs: 900,
            shared_tier_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub max_metrics_history: usize,
    pub sample_interval_secs: u64,
    pub max_response_time_ms: f64,
    pub max_memory_usage_mb: f64,
    pub max_cpu_usage_percent: f64,
    pub min_cache_hit_rate: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            max_metrics_history: 1000,
            sample_interval_secs: 5,
            max_response_time_ms: 2000.0,
            max_memory_usage_mb: 512.0,
            max_cpu_usage_percent: 80.0,
            min_cache_hit_rate: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub summarizer: SummarizerConfig,
    pub scraper: ScraperConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub monitoring: MonitoringConfig,
}

impl AppConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| {
            CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        let config: AppConfig = toml::from_str(&raw).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Build a configuration from defaults plus `REDLENS_*` environment
    /// variable overrides.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = AppConfig::default();

        config.reddit.client_id = env::var("REDLENS_REDDIT_CLIENT_ID").ok();
        config.reddit.client_secret = env::var("REDLENS_REDDIT_CLIENT_SECRET").ok();
        if let Ok(agent) = env::var("REDLENS_REDDIT_USER_AGENT") {
            config.reddit.user_agent = agent;
        }
        config.summarizer.api_key = env::var("REDLENS_OPENAI_API_KEY").ok();
        if let Ok(model) = env::var("REDLENS_OPENAI_MODEL") {
            config.summarizer.model = model;
        }
        if let Ok(url) = env::var("REDLENS_DATABASE_URL") {
            config.database.url = url;
        }

        config.database.pool_size = env_parse("REDLENS_DATABASE_POOL_SIZE", config.database.pool_size)?;
        config.database.max_overflow =
            env_parse("REDLENS_DATABASE_MAX_OVERFLOW", config.database.max_overflow)?;
        config.cache.max_size = env_parse("REDLENS_CACHE_MAX_SIZE", config.cache.max_size)?;
        config.cache.default_ttl_secs =
            env_parse("REDLENS_CACHE_DEFAULT_TTL", config.cache.default_ttl_secs)?;

        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            CoreError::Config(ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
            })
        }),
        Err(_) => Ok(default),
    }
}
