use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Reddit post after translation from the raw API shape. Internal logic
/// only ever sees this type, never the wire representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub author: Option<String>,
    pub url: String,
    pub permalink: String,
    pub selftext: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: DateTime<Utc>,
    pub is_self: bool,
    pub over_18: bool,
    pub spoiler: bool,
    pub stickied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subreddit {
    pub name: String,
    pub title: String,
    pub description: String,
    pub subscribers: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
}

/// One execution of the update-check workflow for a subreddit/topic pair.
/// Identifiers are monotonic and assigned by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: i64,
    pub subreddit: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub posts_found: i64,
    pub new_posts: i64,
}

/// Score and comment movement between two snapshots of the same post.
/// Only produced when a prior snapshot exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementDelta {
    pub score_delta: i64,
    pub comments_delta: i64,
    pub previous_score: i64,
    pub previous_comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostUpdate {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub current_score: i64,
    pub current_comments: i64,
    pub current_timestamp: DateTime<Utc>,
    pub is_new: bool,
    pub engagement_delta: Option<EngagementDelta>,
}

/// Classification output for one batch of fetched posts, in the same
/// relative order as the input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeDetectionResult {
    pub new_posts: Vec<PostUpdate>,
    pub updated_posts: Vec<PostUpdate>,
}

impl ChangeDetectionResult {
    pub fn total_new_posts(&self) -> usize {
        self.new_posts.len()
    }

    pub fn total_updated_posts(&self) -> usize {
        self.updated_posts.len()
    }
}

/// The structured result handed to the HTTP layer after a check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    pub subreddit: String,
    pub topic: String,
    pub check_time: DateTime<Utc>,
    pub last_check_time: Option<DateTime<Utc>>,
    pub new_posts: Vec<PostUpdate>,
    pub updated_posts: Vec<PostUpdate>,
    pub summary: String,
    pub total_posts_found: usize,
    pub is_first_check: bool,
    pub check_run_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Post,
    Comments,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Post => "post",
            SummaryKind::Comments => "comments",
        }
    }
}

/// A candidate subreddit with its relevance score for a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSubreddit {
    pub name: String,
    pub description: String,
    pub score: u32,
}
