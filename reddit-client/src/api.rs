use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redlens_core::{
    Comment, ContentSource, CoreError, Post, RedditApiError, RedditConfig, Subreddit,
};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

// Direct media links are useless for summarization and are dropped at the
// fetch boundary.
const MEDIA_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".mp4"];
const MEDIA_DOMAINS: [&str; 3] = ["i.redd.it", "v.redd.it", "i.imgur.com"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: i64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub spoiler: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSubredditData {
    pub display_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_description: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    config: RedditConfig,
    access_token: String,
}

impl RedditApiClient {
    pub fn new(config: RedditConfig, access_token: String) -> Result<Self, CoreError> {
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::reddit_api()));

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(CoreError::Network)?;

        Ok(Self {
            http_client,
            rate_limiter,
            config,
            access_token,
        })
    }

    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let _permit = self.rate_limiter.acquire_permit().await;
        debug!("Acquired rate limit permit for {} {}", method, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token)
            .header("User-Agent", &self.config.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                    retry_after,
                }))
            }
            401 => Err(CoreError::RedditApi(RedditApiError::InvalidToken)),
            403 => Err(CoreError::RedditApi(RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            })),
            404 => Err(CoreError::NotFound {
                resource: endpoint.to_string(),
            }),
            code if status.is_server_error() => {
                Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: code,
                }))
            }
            _ => Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Unexpected status {} for {}", status, endpoint),
            })),
        }
    }

    async fn fetch_post_listing(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Vec<Post>, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, Some(query_params))
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse post listing: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts from {}", endpoint),
            })
        })?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect())
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

#[async_trait]
impl ContentSource for RedditApiClient {
    async fn search_subreddits(&self, topic: &str, limit: u32) -> Result<Vec<Subreddit>, CoreError> {
        let limit_str = limit.to_string();
        let params = [("q", topic), ("limit", limit_str.as_str())];

        let response = self
            .make_request(Method::GET, "/subreddits/search", Some(&params))
            .await?;

        let listing: RedditListing<RedditSubredditData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit search results: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse subreddit search for '{}'", topic),
            })
        })?;

        let subreddits: Vec<Subreddit> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect();

        info!(
            "Found {} subreddits for topic '{}'",
            subreddits.len(),
            topic
        );
        Ok(subreddits)
    }

    async fn get_hot_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError> {
        let endpoint = format!("/r/{}/hot", subreddit);
        let limit_str = limit.to_string();
        let posts = self
            .fetch_post_listing(&endpoint, &[("limit", limit_str.as_str())])
            .await
            .map_err(|e| subreddit_not_found(e, subreddit))?;

        info!("Retrieved {} hot posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    async fn get_relevant_posts(&self, subreddit: &str) -> Result<Vec<Post>, CoreError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit_str = self.config.relevant_posts_limit.to_string();
        let mut posts = self
            .fetch_post_listing(&endpoint, &[("t", "day"), ("limit", limit_str.as_str())])
            .await
            .map_err(|e| subreddit_not_found(e, subreddit))?;

        // Most-discussed first, then keep the first few non-media posts.
        posts.sort_by(|a, b| b.num_comments.cmp(&a.num_comments));

        let valid_posts: Vec<Post> = posts
            .into_iter()
            .filter(is_valid_post)
            .take(self.config.max_valid_posts)
            .collect();

        info!(
            "Selected {} relevant posts from r/{}",
            valid_posts.len(),
            subreddit
        );
        Ok(valid_posts)
    }

    async fn get_top_comments(&self, post_id: &str, limit: u32) -> Result<Vec<Comment>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let limit_str = limit.to_string();
        let response = self
            .make_request(Method::GET, &endpoint, Some(&[("limit", limit_str.as_str())]))
            .await
            .map_err(|e| match e {
                CoreError::NotFound { .. } => {
                    CoreError::RedditApi(RedditApiError::PostNotFound {
                        post_id: post_id.to_string(),
                    })
                }
                other => other,
            })?;

        // The comments endpoint returns a two-element array: the post listing
        // followed by the comment listing.
        let body: serde_json::Value = response.json().await.map_err(|e| {
            error!("Failed to parse comments response: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {}", post_id),
            })
        })?;

        let comment_listing = body.get(1).cloned().ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Missing comment listing for post {}", post_id),
            })
        })?;

        let listing: RedditListing<serde_json::Value> = serde_json::from_value(comment_listing)
            .map_err(|e| {
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Malformed comment listing for post {}: {}", post_id, e),
                })
            })?;

        let mut comments: Vec<Comment> = Vec::new();
        for child in listing.data.children {
            // "more" placeholders carry no comment body and are skipped.
            if child.kind != "t1" {
                continue;
            }
            match serde_json::from_value::<RedditCommentData>(child.data) {
                Ok(data) => comments.push(data.into()),
                Err(e) => warn!("Skipping unparseable comment on post {}: {}", post_id, e),
            }
        }

        comments.sort_by(|a, b| b.score.cmp(&a.score));
        comments.truncate(limit as usize);

        info!(
            "Retrieved {} top comments for post {}",
            comments.len(),
            post_id
        );
        Ok(comments)
    }
}

fn subreddit_not_found(err: CoreError, subreddit: &str) -> CoreError {
    match err {
        CoreError::NotFound { .. } => CoreError::RedditApi(RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        }),
        other => other,
    }
}

/// Text posts are always valid; link posts must not point at media content.
fn is_valid_post(post: &Post) -> bool {
    if post.is_self {
        return true;
    }

    let url = post.url.to_lowercase();
    if MEDIA_EXTENSIONS.iter().any(|ext| url.ends_with(ext)) {
        return false;
    }

    !MEDIA_DOMAINS.iter().any(|domain| url.contains(domain))
}

impl From<RedditPostData> for Post {
    fn from(data: RedditPostData) -> Self {
        Self {
            id: data.id,
            subreddit: data.subreddit,
            title: data.title,
            author: data.author,
            url: data.url,
            permalink: data.permalink,
            selftext: data.selftext,
            score: data.score,
            num_comments: data.num_comments,
            created_utc: timestamp_to_datetime(data.created_utc),
            is_self: data.is_self,
            over_18: data.over_18,
            spoiler: data.spoiler,
            stickied: data.stickied,
        }
    }
}

impl From<RedditSubredditData> for Subreddit {
    fn from(data: RedditSubredditData) -> Self {
        Self {
            name: data.display_name,
            title: data.title,
            description: data.public_description,
            subscribers: data.subscribers,
        }
    }
}

impl From<RedditCommentData> for Comment {
    fn from(data: RedditCommentData) -> Self {
        Self {
            id: data.id,
            author: data.author,
            body: data.body,
            score: data.score,
            created_utc: timestamp_to_datetime(data.created_utc),
        }
    }
}

fn timestamp_to_datetime(epoch_seconds: f64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(epoch_seconds as i64, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post_data(id: &str, url: &str, is_self: bool) -> RedditPostData {
        RedditPostData {
            id: id.to_string(),
            title: "Test Post".to_string(),
            selftext: "This is test content".to_string(),
            author: Some("test_user".to_string()),
            subreddit: "test".to_string(),
            url: url.to_string(),
            permalink: format!("/r/test/comments/{}", id),
            created_utc: 1640995200.0,
            score: 42,
            num_comments: 5,
            over_18: false,
            spoiler: false,
            stickied: false,
            is_self,
        }
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = RedditApiClient::new(RedditConfig::default(), "token".to_string()).unwrap();
        let status = client.get_rate_limit_status().await;
        assert!(status.available_tokens > 0);
    }

    #[test]
    fn test_post_conversion() {
        let data = sample_post_data("abc123", "https://example.com/article", false);
        let post: Post = data.into();
        assert_eq!(post.id, "abc123");
        assert_eq!(post.score, 42);
        assert_eq!(post.created_utc.timestamp(), 1640995200);
        assert_eq!(post.author.as_deref(), Some("test_user"));
    }

    #[test]
    fn test_media_posts_are_filtered() {
        let text_post: Post = sample_post_data("a", "https://reddit.com/r/test", true).into();
        let article: Post = sample_post_data("b", "https://example.com/story", false).into();
        let image: Post = sample_post_data("c", "https://i.redd.it/xyz.jpg", false).into();
        let video: Post = sample_post_data("d", "https://v.redd.it/clip", false).into();
        let gif: Post = sample_post_data("e", "https://example.com/funny.GIF", false).into();

        assert!(is_valid_post(&text_post));
        assert!(is_valid_post(&article));
        assert!(!is_valid_post(&image));
        assert!(!is_valid_post(&video));
        assert!(!is_valid_post(&gif));
    }

    #[test]
    fn test_listing_deserialization_with_missing_optionals() {
        let raw = r#"{
            "kind": "Listing",
            "data": {
                "children": [
                    {
                        "kind": "t3",
                        "data": {
                            "id": "p1",
                            "title": "Hello",
                            "subreddit": "rust",
                            "url": "https://example.com",
                            "permalink": "/r/rust/comments/p1",
                            "created_utc": 1700000000.0,
                            "score": 10,
                            "num_comments": 2
                        }
                    }
                ],
                "after": null,
                "before": null
            }
        }"#;
        let listing: RedditListing<RedditPostData> = serde_json::from_str(raw).unwrap();
        assert_eq!(listing.data.children.len(), 1);
        let post: Post = listing.data.children[0].data.clone().into();
        assert!(post.author.is_none());
        assert!(!post.over_18);
    }
}
