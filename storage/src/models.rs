use chrono::{DateTime, Utc};
use redlens_core::CheckRun;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted, point-in-time record of a single post's mutable fields,
/// tied to the check run that observed it. Snapshots are append-only; the
/// same post recurs across check runs as new rows.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub id: i64,
    pub post_id: String,
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
    pub check_run_id: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CheckRunRecord {
    pub id: i64,
    pub subreddit: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub posts_found: i64,
    pub new_posts: i64,
}

impl From<CheckRunRecord> for CheckRun {
    fn from(record: CheckRunRecord) -> Self {
        Self {
            id: record.id,
            subreddit: record.subreddit,
            topic: record.topic,
            timestamp: record.timestamp,
            posts_found: record.posts_found,
            new_posts: record.new_posts,
        }
    }
}

/// A post ranked by score velocity within a recent time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingPost {
    pub post_id: String,
    pub title: String,
    pub score: i64,
    pub num_comments: i64,
    pub age_hours: f64,
    pub trending_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubredditStats {
    pub subreddit: String,
    pub total_check_runs: i64,
    pub total_snapshots: i64,
    pub distinct_posts: i64,
    pub average_score: f64,
    pub max_score: i64,
    pub earliest_check: Option<DateTime<Utc>>,
    pub latest_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRunPage {
    pub check_runs: Vec<CheckRun>,
    pub total_count: i64,
    pub page: u32,
    pub limit: u32,
}

impl CheckRunPage {
    pub fn total_pages(&self) -> i64 {
        if self.limit == 0 {
            return 0;
        }
        (self.total_count + self.limit as i64 - 1) / self.limit as i64
    }
}
