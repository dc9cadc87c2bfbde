//! Collaborator seams consumed by the update-check engine. Production
//! implementations live in the client crates; tests substitute fakes.

use crate::error::CoreError;
use crate::types::{Comment, Post, Subreddit, SummaryKind};
use async_trait::async_trait;

/// Source of Reddit content. Implementations translate the raw API shape
/// into [`Post`] values at the fetch boundary.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn search_subreddits(&self, topic: &str, limit: u32) -> Result<Vec<Subreddit>, CoreError>;

    async fn get_hot_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError>;

    /// Up to five posts from the last day, sorted by comment count
    /// descending, with direct media links filtered out.
    async fn get_relevant_posts(&self, subreddit: &str) -> Result<Vec<Post>, CoreError>;

    async fn get_top_comments(&self, post_id: &str, limit: u32) -> Result<Vec<Comment>, CoreError>;
}

/// Content summarization. Must degrade to a fixed sentinel string on any
/// failure instead of propagating an error.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, content: &str, kind: SummaryKind) -> String;
}

/// Article scraping. Implementations validate the URL against the SSRF
/// policy before fetching and degrade to a fixed sentinel on rejection or
/// fetch error.
#[async_trait]
pub trait Scrape: Send + Sync {
    async fn scrape(&self, url: &str) -> String;
}
